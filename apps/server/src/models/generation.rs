use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One successful story weaving by one user. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GenerationEvent {
    pub id: Uuid,
    pub user_id: i32,
    /// Dream produced by the generation; cleared if the dream is later deleted
    pub dream_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl GenerationEvent {
    pub fn new(user_id: i32, dream_id: Option<Uuid>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            dream_id,
            occurred_at,
        }
    }
}

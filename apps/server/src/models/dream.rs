use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Longest dream text accepted for weaving
pub const MAX_DREAM_TEXT_LEN: usize = 5000;

/// Longest title a user may set on a woven story
pub const MAX_TITLE_LEN: usize = 200;

/// A recorded dream together with the story woven from it
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dream {
    pub id: Uuid,
    pub user_id: i32,
    pub dream_text: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields persisted for a freshly woven dream
#[derive(Debug, Clone)]
pub struct NewDream {
    pub user_id: i32,
    pub dream_text: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub is_public: bool,
}

/// Body of `POST /api/dreams/weave`
#[derive(Debug, Deserialize)]
pub struct WeaveDreamRequest {
    pub dream_text: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// DTO for updating a dream
#[derive(Debug, Deserialize)]
pub struct UpdateDream {
    pub title: Option<String>,
    pub is_public: Option<bool>,
}

/// A shared dream as seen in the public library
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PublicDream {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub mood: Option<String>,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

impl Dream {
    pub fn is_visible_to(&self, user_id: i32) -> bool {
        self.is_public || self.user_id == user_id
    }
}

//! Durable storage for generation events.
//!
//! The tracker only needs "events for user X since T" and an append, so the
//! store is a small trait with a Postgres implementation for the server and an
//! in-memory one for tests and local tooling.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::GenerationEvent;

/// Advisory lock class for per-user generation accounting
const GENERATION_LOCK_CLASS: i32 = 0x4f4e;

/// Constraint names from the generation_events migration
const USER_FOREIGN_KEY: &str = "generation_events_user_id_fkey";
const DREAM_FOREIGN_KEY: &str = "generation_events_dream_id_fkey";

/// Decides from a user's current events whether one more may be appended
pub type AdmitFn = dyn Fn(&[GenerationEvent]) -> bool + Send + Sync;

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Whether the user has a profile
    async fn user_exists(&self, user_id: i32) -> AppResult<bool>;

    /// Events of a user with `occurred_at >= since`, oldest first
    async fn events_since(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<GenerationEvent>>;

    /// Appends one event. Fails with `NotFound` for an unknown user.
    async fn append(&self, event: &GenerationEvent) -> AppResult<()>;

    /// Loads the user's events since `since` and appends `event` only if
    /// `admit` accepts them, as one atomic step per user.
    ///
    /// Returns whether the event was appended.
    async fn append_if(
        &self,
        event: &GenerationEvent,
        since: DateTime<Utc>,
        admit: &AdmitFn,
    ) -> AppResult<bool>;
}

// =============================================================================
// Postgres
// =============================================================================

pub struct PgGenerationStore {
    pool: PgPool,
}

impl PgGenerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn insert_error(err: sqlx::Error, event: &GenerationEvent) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_foreign_key_violation() {
            match db_err.constraint() {
                Some(USER_FOREIGN_KEY) => {
                    return AppError::NotFound(format!(
                        "User with id {} not found",
                        event.user_id
                    ))
                }
                Some(DREAM_FOREIGN_KEY) => {
                    return AppError::NotFound(match event.dream_id {
                        Some(id) => format!("Dream with id {} not found", id),
                        None => "Dream not found".to_string(),
                    })
                }
                _ => {}
            }
        }
    }
    log::error!(
        "Failed to record generation for user {}: {}",
        event.user_id,
        err
    );
    AppError::unavailable(err)
}

fn query_error(err: sqlx::Error) -> AppError {
    log::error!("Generation store query failed: {}", err);
    AppError::unavailable(err)
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    async fn user_exists(&self, user_id: i32) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn events_since(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<GenerationEvent>> {
        sqlx::query_as::<_, GenerationEvent>(
            r#"
            SELECT id, user_id, dream_id, occurred_at
            FROM generation_events
            WHERE user_id = $1 AND occurred_at >= $2
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)
    }

    async fn append(&self, event: &GenerationEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_events (id, user_id, dream_id, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.dream_id)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, event))?;

        Ok(())
    }

    async fn append_if(
        &self,
        event: &GenerationEvent,
        since: DateTime<Utc>,
        admit: &AdmitFn,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        // Serializes accounting per user; released on commit/rollback
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(GENERATION_LOCK_CLASS)
            .bind(event.user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        let existing = sqlx::query_as::<_, GenerationEvent>(
            r#"
            SELECT id, user_id, dream_id, occurred_at
            FROM generation_events
            WHERE user_id = $1 AND occurred_at >= $2
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(event.user_id)
        .bind(since)
        .fetch_all(&mut *tx)
        .await
        .map_err(query_error)?;

        if !admit(&existing) {
            tx.rollback().await.map_err(query_error)?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO generation_events (id, user_id, dream_id, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.dream_id)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, event))?;

        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store. Users must be registered before events are accepted.
#[derive(Default)]
pub struct MemoryGenerationStore {
    users: Mutex<HashSet<i32>>,
    events: Mutex<HashMap<i32, Vec<GenerationEvent>>>,
    offline: AtomicBool,
}

impl MemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: i32) {
        self.lock_users().insert(user_id);
    }

    /// Makes every subsequent call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every stored event of a user, in insertion order
    pub fn all_events(&self, user_id: i32) -> Vec<GenerationEvent> {
        self.lock_events()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check_online(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable(
                "generation store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn lock_users(&self) -> std::sync::MutexGuard<'_, HashSet<i32>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, HashMap<i32, Vec<GenerationEvent>>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_user(&self, user_id: i32) -> AppResult<()> {
        if !self.lock_users().contains(&user_id) {
            return Err(AppError::NotFound(format!(
                "User with id {} not found",
                user_id
            )));
        }
        Ok(())
    }

    fn select_since(
        events: &HashMap<i32, Vec<GenerationEvent>>,
        user_id: i32,
        since: DateTime<Utc>,
    ) -> Vec<GenerationEvent> {
        let mut selected: Vec<GenerationEvent> = events
            .get(&user_id)
            .map(|list| {
                list.iter()
                    .filter(|e| e.occurred_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        selected.sort_by_key(|e| (e.occurred_at, e.id));
        selected
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn user_exists(&self, user_id: i32) -> AppResult<bool> {
        self.check_online()?;
        Ok(self.lock_users().contains(&user_id))
    }

    async fn events_since(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<GenerationEvent>> {
        self.check_online()?;
        Ok(Self::select_since(&self.lock_events(), user_id, since))
    }

    async fn append(&self, event: &GenerationEvent) -> AppResult<()> {
        self.check_online()?;
        self.ensure_user(event.user_id)?;
        self.lock_events()
            .entry(event.user_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn append_if(
        &self,
        event: &GenerationEvent,
        since: DateTime<Utc>,
        admit: &AdmitFn,
    ) -> AppResult<bool> {
        self.check_online()?;
        self.ensure_user(event.user_id)?;

        // Held across the check and the push so the pair is atomic
        let mut events = self.lock_events();
        let existing = Self::select_since(&events, event.user_id, since);
        if !admit(&existing) {
            return Ok(false);
        }
        events
            .entry(event.user_id)
            .or_default()
            .push(event.clone());
        Ok(true)
    }
}

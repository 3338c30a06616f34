//! Daily weaving quota.
//!
//! Answers "can this user weave another dream right now, and if not, when can
//! they?" from the append-only log of successful generations. Exceeding the
//! limit is a normal status, not an error: only missing users (`NotFound`)
//! and an unreachable store (`Unavailable`) fail.

pub mod store;
pub mod window;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::error::{AppError, AppResult};
use crate::models::GenerationEvent;

pub use store::{AdmitFn, GenerationStore, MemoryGenerationStore, PgGenerationStore};
pub use window::{QuotaStatus, QuotaWindow, WINDOW_LENGTH};

/// Result of accounting a generation
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(GenerationEvent),
    /// Strict mode only: the window was already full when the write landed
    Refused(QuotaStatus),
}

#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn GenerationStore>,
    config: QuotaConfig,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn GenerationStore>, config: QuotaConfig) -> Self {
        Self { store, config }
    }

    /// Quota status of a user at `now`. Read-only.
    pub async fn get_status(&self, user_id: i32, now: DateTime<Utc>) -> AppResult<QuotaStatus> {
        if !self.store.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!(
                "User with id {} not found",
                user_id
            )));
        }

        let since = self.config.window.lookback(now);
        let events = self.store.events_since(user_id, since).await?;
        let status = QuotaStatus::compute(&self.config.window, self.config.daily_limit, now, events);

        log::debug!(
            "Quota for user {}: {}/{} used, resets in {:.2}h",
            user_id,
            status.current_count,
            status.daily_limit,
            status.hours_until_reset
        );

        Ok(status)
    }

    /// Whether the user may start another generation at `now`
    pub async fn can_generate(&self, user_id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        Ok(!self.get_status(user_id, now).await?.has_reached_limit)
    }

    /// Appends a generation event. Call only after the generation succeeded.
    pub async fn record_generation(
        &self,
        user_id: i32,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<GenerationEvent> {
        let event = GenerationEvent::new(user_id, None, occurred_at);
        self.store.append(&event).await?;
        Ok(event)
    }

    /// Accounts a woven dream, honouring the configured enforcement mode.
    ///
    /// In strict mode the count and the insert happen atomically and a full
    /// window yields `Refused`; otherwise the event is always appended.
    pub async fn record_weaving(
        &self,
        user_id: i32,
        dream_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<RecordOutcome> {
        let event = GenerationEvent::new(user_id, Some(dream_id), occurred_at);

        if !self.config.strict {
            self.store.append(&event).await?;
            return Ok(RecordOutcome::Recorded(event));
        }

        let policy = self.config.window;
        let limit = self.config.daily_limit;
        let admit = move |existing: &[GenerationEvent]| {
            let counted = existing
                .iter()
                .filter(|e| policy.contains(occurred_at, e.occurred_at))
                .count() as i64;
            counted < limit
        };

        let since = policy.lookback(occurred_at);
        if self.store.append_if(&event, since, &admit).await? {
            return Ok(RecordOutcome::Recorded(event));
        }

        log::warn!(
            "Refused generation for user {}: daily limit of {} already used",
            user_id,
            limit
        );
        let status = self.get_status(user_id, occurred_at).await?;
        Ok(RecordOutcome::Refused(status))
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::dream::MAX_DREAM_TEXT_LEN;
use crate::models::{Dream, NewDream, WeaveDreamRequest};
use crate::services::quota::{QuotaStatus, QuotaTracker, RecordOutcome};
use crate::services::weaver::{StoryWeaver, WeaveOutcome, WeaveRequest};
use crate::services::DreamService;

/// Longest mood/style hint forwarded to the weaver
const MAX_HINT_LEN: usize = 50;

/// Result of a weave request that did not fail
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WeaveResult {
    Woven {
        dream: Dream,
        #[serde(skip_serializing_if = "Option::is_none")]
        quota: Option<QuotaStatus>,
    },
    /// The daily quota is used up; nothing was generated or stored
    Limited(QuotaStatus),
}

pub struct WeavingService;

impl WeavingService {
    /// Weaves a dream into a story for `user_id`.
    ///
    /// The quota is checked before the weaver is called and charged only after
    /// the story is stored. If charging fails, the stored dream is removed again
    /// so the user never keeps a story that was not accounted for.
    pub async fn weave(
        pool: &PgPool,
        tracker: &QuotaTracker,
        weaver: &dyn StoryWeaver,
        user_id: i32,
        input: WeaveDreamRequest,
        now: DateTime<Utc>,
    ) -> AppResult<WeaveResult> {
        let request = Self::validate(user_id, &input)?;

        let status = tracker.get_status(user_id, now).await?;
        if status.has_reached_limit {
            log::warn!(
                "Weave refused for user {}: {}/{} used, resets in {:.1}h",
                user_id,
                status.current_count,
                status.daily_limit,
                status.hours_until_reset
            );
            return Ok(WeaveResult::Limited(status));
        }

        let story = match weaver.weave(&request).await {
            WeaveOutcome::Success(story) => story,
            WeaveOutcome::Failure {
                code,
                message,
                retryable,
            } => {
                log::warn!("Weaver failed for user {}: {} ({})", user_id, code, message);
                return Err(AppError::Upstream {
                    message: format!("{}: {}", code, message),
                    retryable,
                });
            }
        };

        let dream = DreamService::create(
            pool,
            &NewDream {
                user_id,
                dream_text: request.dream_text,
                title: story.title,
                content: story.content,
                image_url: story.image_url,
                mood: request.mood,
                style: request.style,
                is_public: input.is_public,
            },
        )
        .await?;

        let completed_at = Utc::now().max(now);
        let outcome = match tracker.record_weaving(user_id, dream.id, completed_at).await {
            Ok(outcome) => outcome,
            Err(e) => {
                Self::undo_dream(pool, &dream).await;
                return Err(e);
            }
        };

        match outcome {
            RecordOutcome::Recorded(event) => {
                log::info!("User {} wove dream {} ({})", user_id, dream.id, event.id);
                let quota = match tracker.get_status(user_id, completed_at).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        log::warn!("Could not refresh quota for user {}: {}", user_id, e);
                        None
                    }
                };
                Ok(WeaveResult::Woven { dream, quota })
            }
            RecordOutcome::Refused(status) => {
                Self::undo_dream(pool, &dream).await;
                Ok(WeaveResult::Limited(status))
            }
        }
    }

    fn validate(user_id: i32, input: &WeaveDreamRequest) -> AppResult<WeaveRequest> {
        let dream_text = input.dream_text.trim();
        if dream_text.is_empty() {
            return Err(AppError::Validation(
                "Dream text cannot be empty".to_string(),
            ));
        }
        if dream_text.chars().count() > MAX_DREAM_TEXT_LEN {
            return Err(AppError::Validation(format!(
                "Dream text cannot exceed {} characters",
                MAX_DREAM_TEXT_LEN
            )));
        }

        Ok(WeaveRequest {
            user_id,
            dream_text: dream_text.to_string(),
            mood: clean_hint("mood", input.mood.as_deref())?,
            style: clean_hint("style", input.style.as_deref())?,
        })
    }

    async fn undo_dream(pool: &PgPool, dream: &Dream) {
        if let Err(e) = DreamService::delete_unchecked(pool, dream.id).await {
            log::error!(
                "Failed to remove unaccounted dream {} of user {}: {}",
                dream.id,
                dream.user_id,
                e
            );
        }
    }
}

fn clean_hint(field: &str, value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if v.chars().count() > MAX_HINT_LEN => Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, MAX_HINT_LEN
        ))),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

//! Story weaver: the external AI service that turns a dream into a story.
//!
//! The service is opaque to us. Its replies are validated here, at the
//! boundary, into a tagged [`WeaveOutcome`] so nothing downstream handles a
//! loosely shaped payload.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpWeaver;

/// Longest title accepted from the weaver
const MAX_WOVEN_TITLE_LEN: usize = 200;

/// What the weaver is asked to do
#[derive(Debug, Clone, Serialize)]
pub struct WeaveRequest {
    pub user_id: i32,
    pub dream_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// A validated story
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WovenStory {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
}

/// Result of a weave attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeaveOutcome {
    Success(WovenStory),
    Failure {
        code: String,
        message: String,
        /// Transient failures (timeouts, overload) may be retried by the user
        retryable: bool,
    },
}

impl WeaveOutcome {
    pub fn failure(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        WeaveOutcome::Failure {
            code: code.to_string(),
            message: message.into(),
            retryable,
        }
    }
}

/// Trait for story weavers (Strategy pattern)
#[async_trait]
pub trait StoryWeaver: Send + Sync {
    async fn weave(&self, request: &WeaveRequest) -> WeaveOutcome;
}

// =============================================================================
// Wire format
// =============================================================================

/// Response body as sent by the weaver service
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WeaveResponse {
    Success {
        title: String,
        content: String,
        #[serde(default)]
        image_url: Option<String>,
    },
    Failure {
        code: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        retryable: bool,
    },
}

impl WeaveResponse {
    /// Validates a decoded response into an outcome
    pub fn into_outcome(self) -> WeaveOutcome {
        match self {
            WeaveResponse::Success {
                title,
                content,
                image_url,
            } => {
                let title = title.trim().to_string();
                let content = content.trim().to_string();
                if title.is_empty() || content.is_empty() {
                    return WeaveOutcome::failure(
                        "invalid_response",
                        "weaver returned an empty title or story",
                        false,
                    );
                }
                if title.chars().count() > MAX_WOVEN_TITLE_LEN {
                    return WeaveOutcome::failure(
                        "invalid_response",
                        "weaver returned an overlong title",
                        false,
                    );
                }
                let image_url = match image_url.filter(|u| !u.trim().is_empty()) {
                    Some(url) if is_http_url(&url) => Some(url),
                    Some(_) => {
                        return WeaveOutcome::failure(
                            "invalid_response",
                            "weaver returned an invalid image URL",
                            false,
                        )
                    }
                    None => None,
                };
                WeaveOutcome::Success(WovenStory {
                    title,
                    content,
                    image_url,
                })
            }
            WeaveResponse::Failure {
                code,
                message,
                retryable,
            } => WeaveOutcome::Failure {
                message: message.unwrap_or_else(|| code.clone()),
                code,
                retryable,
            },
        }
    }

    /// Parses and validates a raw response body
    pub fn parse(body: &[u8]) -> WeaveOutcome {
        match serde_json::from_slice::<WeaveResponse>(body) {
            Ok(response) => response.into_outcome(),
            Err(e) => WeaveOutcome::failure(
                "invalid_response",
                format!("unreadable weaver response: {}", e),
                false,
            ),
        }
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

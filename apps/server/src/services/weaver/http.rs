//! HTTP story weaver.
//!
//! Sends the dream as a JSON POST. Requests carry the API key as a Bearer
//! token and, when a signing secret is configured, an HMAC-SHA256 signature
//! over `"{timestamp}.{body}"`.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;

use super::{StoryWeaver, WeaveOutcome, WeaveRequest, WeaveResponse};
use crate::config::WeaverConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub struct HttpWeaver {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    signing_secret: Option<String>,
}

impl HttpWeaver {
    pub fn new(config: &WeaverConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            signing_secret: config.signing_secret.clone(),
        })
    }

    /// Generates the HMAC-SHA256 signature for a request body
    pub fn generate_signature(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Interprets a non-success HTTP reply
    fn error_outcome(status: StatusCode, body: &[u8]) -> WeaveOutcome {
        let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

        match WeaveResponse::parse(body) {
            WeaveOutcome::Failure {
                code,
                message,
                retryable,
            } if code != "invalid_response" => WeaveOutcome::Failure {
                code,
                message,
                retryable: retryable || transient,
            },
            _ => WeaveOutcome::failure(
                if transient {
                    "weaver_unavailable"
                } else {
                    "weaver_rejected"
                },
                format!("HTTP {}", status.as_u16()),
                transient,
            ),
        }
    }
}

#[async_trait]
impl StoryWeaver for HttpWeaver {
    async fn weave(&self, request: &WeaveRequest) -> WeaveOutcome {
        let body = match serde_json::to_vec(request) {
            Ok(b) => b,
            Err(e) => {
                return WeaveOutcome::failure(
                    "invalid_request",
                    format!("Failed to serialize request: {}", e),
                    false,
                )
            }
        };

        let timestamp = Utc::now().timestamp().to_string();

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Oneiri-Timestamp", &timestamp);

        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        if let Some(ref secret) = self.signing_secret {
            let signature = Self::generate_signature(secret, &timestamp, &body);
            builder = builder.header("X-Oneiri-Signature", format!("sha256={}", signature));
        }

        let response = match builder.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Weaver request for user {} failed: {}", request.user_id, e);
                let message = if e.is_timeout() {
                    "Request timed out".to_string()
                } else if e.is_connect() {
                    "Connection failed".to_string()
                } else {
                    format!("Request failed: {}", e)
                };
                return WeaveOutcome::failure("weaver_unavailable", message, true);
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return WeaveOutcome::failure(
                    "weaver_unavailable",
                    format!("Failed to read response: {}", e),
                    true,
                )
            }
        };

        if status.is_success() {
            WeaveResponse::parse(&bytes)
        } else {
            log::warn!(
                "Weaver answered HTTP {} for user {}",
                status.as_u16(),
                request.user_id
            );
            Self::error_outcome(status, &bytes)
        }
    }
}

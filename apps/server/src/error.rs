use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

/// Seconds a client should wait before retrying a 503
pub const UNAVAILABLE_RETRY_AFTER_SECS: u64 = 5;

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A backing store could not be reached; the request may be retried
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The story weaver rejected or failed the request
    #[error("Upstream error: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps a storage failure as `Unavailable`
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        AppError::Unavailable(err.to_string())
    }

    /// True when the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Unavailable(_) => true,
            AppError::Database(e) => is_connectivity_error(e),
            AppError::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Pool exhaustion and I/O failures mean the database is unreachable, not that the query was wrong
fn is_connectivity_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(e) if is_connectivity_error(e) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream {
                retryable: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_type = match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) => "ValidationError",
            AppError::Conflict(_) => "Conflict",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Unavailable(_) => "Unavailable",
            AppError::Database(e) if is_connectivity_error(e) => "Unavailable",
            AppError::Database(_) => "DatabaseError",
            AppError::Upstream { .. } => "UpstreamError",
            AppError::Internal(_) => "InternalError",
        };

        let retryable = self.is_retryable();
        let response = ErrorResponse {
            error: ErrorDetail {
                error_type: error_type.to_string(),
                message: self.to_string(),
                retryable,
            },
        };

        let mut builder = HttpResponse::build(self.status_code());
        if retryable {
            builder.insert_header(("Retry-After", UNAVAILABLE_RETRY_AFTER_SECS.to_string()));
        }
        builder.json(response)
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

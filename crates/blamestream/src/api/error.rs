//! API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::blame::BlameError;
use crate::repo::ResolveError;
use crate::stream::{ContextError, WriterError};

/// Errors returned before a stream is committed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            ApiError::ServiceUnavailable(msg) | ApiError::GatewayTimeout(msg) => {
                warn!(error_code = code, message = %msg, "Request did not complete");
            }
            _ => {
                tracing::debug!(error_code = code, message = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => ApiError::ServiceUnavailable(err.to_string()),
            ContextError::DeadlineExceeded => ApiError::GatewayTimeout(err.to_string()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidName(_) => ApiError::BadRequest(err.to_string()),
            ResolveError::RepoNotFound(_) | ResolveError::RevisionNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            ResolveError::Context(ctx) => ctx.into(),
            ResolveError::Git(_) | ResolveError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BlameError> for ApiError {
    fn from(err: BlameError) -> Self {
        match err {
            BlameError::NotFound(_) => ApiError::NotFound(err.to_string()),
            BlameError::Context(ctx) => ctx.into(),
            BlameError::Spawn(_)
            | BlameError::Io(_)
            | BlameError::Git { .. }
            | BlameError::Parse(_)
            | BlameError::Closed => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<WriterError> for ApiError {
    fn from(err: WriterError) -> Self {
        ApiError::Internal(format!("opening response stream: {err}"))
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_mapping() {
        let err: ApiError = ResolveError::InvalidName("../x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = ResolveError::RepoNotFound("x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = ResolveError::RevisionNotFound {
            repo: "x".to_string(),
            rev: "v9".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = ResolveError::Git("fatal".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_blame_error_mapping() {
        let err: ApiError = BlameError::NotFound("a.go".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = BlameError::Context(ContextError::DeadlineExceeded).into();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let err: ApiError = BlameError::Parse("x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_writer_error_is_internal() {
        let err: ApiError = WriterError::SinkClosed.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

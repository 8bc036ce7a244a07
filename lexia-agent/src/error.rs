//! Error types for lexia-agent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::reply::ReplyError;

/// Agent service errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: missing or invalid shared secret")]
    Unauthorized,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The user message is already recorded and its id marked seen; a retry is a duplicate.
    #[error("Reply generation failed: {0}")]
    ReplyGeneration(String),
}

impl AgentError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            Self::ReplyGeneration(_) => (StatusCode::BAD_GATEWAY, "REPLY_GENERATION_FAILED"),
        }
    }
}

impl From<ReplyError> for AgentError {
    fn from(err: ReplyError) -> Self {
        Self::ReplyGeneration(err.to_string())
    }
}

/// API error payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            success: false,
            error: ApiError {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::SessionNotFound("wa_1".to_string());
        assert_eq!(err.to_string(), "Session not found: wa_1");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AgentError::InvalidRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AgentError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AgentError::SessionNotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert!(AgentError::ReplyGeneration("x".into())
            .into_response()
            .status()
            .is_server_error());
    }

    #[test]
    fn test_from_reply_error() {
        let err: AgentError = ReplyError::EmptyReply.into();
        assert!(matches!(err, AgentError::ReplyGeneration(_)));
    }
}

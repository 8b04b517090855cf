//! Storyloom — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use storyloom_core::error::EngineError;

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `EngineError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            EngineError::DuplicateAction { .. }
            | EngineError::EmptyActionText
            | EngineError::ActionTooLong { .. }
            | EngineError::InvalidRoll { .. }
            | EngineError::NoJudgment { .. }
            | EngineError::DuplicateRoll { .. }
            | EngineError::DuplicateJudgment { .. }
            | EngineError::UnknownJudgment { .. }
            | EngineError::StaleAck { .. }
            | EngineError::WrongPhase { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            EngineError::UnknownParticipant { .. }
            | EngineError::NotActionOwner { .. }
            | EngineError::NotJudgmentOwner { .. }
            | EngineError::NotHost { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            EngineError::Transport(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            EngineError::Collaborator { .. } => (StatusCode::BAD_GATEWAY, "collaborator_error"),
            EngineError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

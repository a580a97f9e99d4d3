use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::db::StoreError;

/// Unified error type for message handling, shared by the WebSocket event
/// dispatcher and the REST handlers so both paths classify failures the
/// same way.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Malformed or unacceptable input (empty content, oversized content,
    /// self-addressed messages).
    #[error("{0}")]
    Validation(String),

    /// Missing, expired, or invalid session token.
    #[error(transparent)]
    Authentication(#[from] AuthError),

    /// Authenticated caller acting on a resource it does not own.
    #[error("{0}")]
    Forbidden(String),

    /// Referenced user or message does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Storage-layer failure. Details are logged server-side; clients see a
    /// generic message.
    #[error("storage failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ChatError {
    /// Message safe to surface to a client. Internal failures are collapsed
    /// so storage details never leak over the wire.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Persistence(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Persistence(err) = &self {
            tracing::error!(error = %err, "Storage failure while serving request");
        }
        let status = self.status_code();
        let body = Json(json!({
            "error": { "message": self.client_message() }
        }));
        (status, body).into_response()
    }
}

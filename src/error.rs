//! HTTP-facing error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::agent::AgentError;

/// Errors returned by the JSON API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No live session has this id (never existed, removed, or expired).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The external agent failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Agent(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

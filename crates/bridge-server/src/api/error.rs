//! Request API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bridge_core::BridgeError;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// JSON body returned with every non-2xx API response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    pub code: &'static str,
}

/// A [`BridgeError`] surfaced through the HTTP API.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub BridgeError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BridgeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::MissingField(_) | BridgeError::InvalidField(_) => StatusCode::BAD_REQUEST,
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

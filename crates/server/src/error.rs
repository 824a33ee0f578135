//! HTTP errors for the snapembed server.
//!
//! Every failure is answered with `400` and a JSON body `{"error": message}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use snapembed_core::Error;

use crate::service::Unavailable;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The pipeline ran but produced no image.
    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    /// Discovery or oEmbed retrieval failed.
    #[error("No oEmbed available.")]
    NoOEmbed(#[from] Error),
}

impl ApiError {
    fn log(&self) {
        match self {
            ApiError::Unavailable(reason) => match reason.cause() {
                Some(err) => log_error(&err),
                None => tracing::debug!(reason = %reason, "request not served"),
            },
            ApiError::NoOEmbed(err) => log_error(err),
        }
    }
}

fn log_error(err: &Error) {
    if err.is_retryable() {
        tracing::warn!(error = %err, "request failed; a retry may succeed");
    } else {
        tracing::info!(error = %err, "request not served");
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

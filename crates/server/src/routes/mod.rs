//! Route definitions for the snapshot service.
//!
//! ## Routes
//!
//! - `GET /` - Greeting (JSON)
//! - `GET /health` - Health check (JSON)
//! - `GET /oembed/{*url}` - The source URL's oEmbed document
//! - `GET /png/{*url}` - Screenshot of the source URL's embed

mod health;
mod snapshot;

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};

use crate::state::AppState;

/// Build the complete router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health::health_check))
        .route("/oembed/{*url}", get(snapshot::oembed_handler))
        .route("/png/{*url}", get(snapshot::png_handler))
        .with_state(state)
}

async fn home() -> Json<Value> {
    Json(json!({ "message": "Hello, World!" }))
}

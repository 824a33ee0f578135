//! snapembed HTTP server.
//!
//! Serves screenshots of oEmbed-described resources:
//! - **Service**: discovery, type dispatch, and single-flight cached rendering
//! - **Routes**: axum handlers mapping outcomes onto HTTP responses
//! - **Purge**: background sweep of expired images

pub mod error;
pub mod purge;
pub mod routes;
pub mod service;
pub mod state;

pub use error::ApiError;
pub use purge::spawn_purge_task;
pub use routes::router;
pub use service::{SnapshotOutcome, SnapshotService, Unavailable, renderer_from_config};
pub use state::AppState;

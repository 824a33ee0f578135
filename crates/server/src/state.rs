//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::service::SnapshotService;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SnapshotService>,
}

impl AppState {
    pub fn new(service: SnapshotService) -> Self {
        Self { service: Arc::new(service) }
    }
}

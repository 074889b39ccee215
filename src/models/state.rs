use std::sync::Arc;

use tracing::info;

use crate::services::{coordinator::GenerationCoordinator, fallback::FallbackResolver};

/// Application state shared across requests. Needs to be thread-safe.
pub struct AppState {
    pub coordinator: Arc<GenerationCoordinator>,
    pub fallback: FallbackResolver,
    /// Token every thumbnail URL must carry.
    pub preview_token: String,
}

impl AppState {
    pub fn new(coordinator: Arc<GenerationCoordinator>, preview_token: String) -> Self {
        info!("Initializing application state");
        let fallback = FallbackResolver::new(Arc::clone(coordinator.file_index()));
        Self {
            coordinator,
            fallback,
            preview_token,
        }
    }
}

//! # Health Check Handler

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use tracing::{debug, instrument};

use crate::models::AppState;

/// Returns `200 OK` while the service is able to answer requests.
///
/// Performs no file system checks; only reports the number of indexed
/// thumbnails at debug level.
#[instrument(skip_all)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> StatusCode {
    debug!(
        indexed = state.coordinator.store().len(),
        in_flight = state.coordinator.in_flight(),
        "Health check endpoint accessed"
    );
    StatusCode::OK
}

//! # Thumbkeep - Thumbnail Generation & Caching Service
//!
//! ## Modules
//!
//! - [`handlers`] - HTTP request handlers
//! - [`models`] - Resample options, thumbnail specs, cache keys and artifacts
//! - [`services`] - Resampling engine, thumbnail store, generation coordinator,
//!   fallback placeholders and the file index seam
//! - [`utils`] - Constants, configuration and file helpers

pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{Router, routing::get};
use tracing::{info, instrument};

use crate::handlers::{health_check, serve_thumbnail};
use crate::models::AppState;
use crate::services::{
    coordinator::GenerationCoordinator,
    file_index::{DirectoryFileIndex, FileIndex},
    resample::ResamplingEngine,
    store::ThumbnailStore,
};
use crate::utils::config::ServiceConfig;

/// Creates the router with a [`DirectoryFileIndex`] over
/// `config.originals_dir`.
#[inline]
pub async fn app(config: ServiceConfig) -> std::io::Result<Router> {
    let file_index = Arc::new(DirectoryFileIndex::new(config.originals_dir.clone()));
    app_with_file_index(config, file_index).await
}

/// Creates the router around a caller-provided file index.
///
/// Opens (and reconciles) the thumbnail store, wires the engine and the
/// coordinator together, and spawns the periodic maintenance task.
///
/// # Errors
///
/// Fails when the cache directory cannot be created or scanned.
pub async fn app_with_file_index(
    config: ServiceConfig,
    file_index: Arc<dyn FileIndex>,
) -> std::io::Result<Router> {
    let state = build_state(&config, file_index).await?;

    let maintenance_state = Arc::clone(&state);
    let interval = config.sweep_interval;
    let max_bytes = config.cache_max_bytes;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            run_maintenance(&maintenance_state, max_bytes).await;
        }
    });

    Ok(router(state))
}

/// Builds the shared state from `config`.
pub async fn build_state(
    config: &ServiceConfig,
    file_index: Arc<dyn FileIndex>,
) -> std::io::Result<Arc<AppState>> {
    let store = Arc::new(ThumbnailStore::open(config.cache_dir.clone()).await?);
    let engine = Arc::new(ResamplingEngine::new(
        config.max_pixels,
        config.max_source_dimension,
        config.jpeg_quality,
    ));
    let coordinator = Arc::new(GenerationCoordinator::new(
        store,
        engine,
        file_index,
        config.workers,
        config.generation_timeout,
    ));

    Ok(Arc::new(AppState::new(
        coordinator,
        config.preview_token.clone(),
    )))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/api/thumbnails/{token}/{*file_id}", get(serve_thumbnail))
        .with_state(state)
}

/// Removes stale thumbnails, then trims the cache to `max_bytes`.
#[instrument(skip(state))]
pub async fn run_maintenance(state: &AppState, max_bytes: u64) {
    let store = state.coordinator.store();
    let stale = store
        .sweep_stale(state.coordinator.file_index().as_ref())
        .await;
    let evicted = store.evict_to_capacity(max_bytes).await;
    info!(
        stale,
        evicted,
        remaining = store.len(),
        "Thumbnail cache maintenance finished"
    );
}

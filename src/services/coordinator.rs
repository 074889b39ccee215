//! # Generation Coordinator
//!
//! Serves thumbnails from the store and generates missing ones, making sure
//! that at most one generation per cache key runs at any time.
//!
//! ## Tickets
//!
//! The in-flight map associates a cache key with the list of callers waiting
//! for it. The first caller for a key inserts the ticket and spawns the
//! generation task; later callers push a receiver onto the same ticket. The
//! map lock is only held while touching the map, never while decoding.
//!
//! The generation task is detached from the callers: when a caller times out
//! or its request is dropped, only that caller stops waiting. Once the task
//! finishes, the ticket is removed and every waiter receives the same outcome.
//! Failures are not remembered, the next request starts over. The ticket is
//! released from a drop guard, so a panicking task fails its waiters instead
//! of leaving the key stuck.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Semaphore, oneshot};
use tracing::{Instrument, debug, info_span, instrument, trace, warn};

use crate::error::{ThumbError, ThumbResult};
use crate::models::{
    CacheKey, OptionFlag, ResampleOptions, ThumbnailSpec, validate_dimensions,
};
use crate::services::{file_index::FileIndex, resample::ResamplingEngine, store::ThumbnailStore};

type Outcome = ThumbResult<PathBuf>;
type Waiters = Vec<oneshot::Sender<Outcome>>;

pub struct GenerationCoordinator {
    store: Arc<ThumbnailStore>,
    engine: Arc<ResamplingEngine>,
    file_index: Arc<dyn FileIndex>,
    in_flight: DashMap<CacheKey, Waiters>,
    workers: Arc<Semaphore>,
    timeout: Duration,
    generations: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

/// Owns a ticket for the lifetime of its generation task.
struct Ticket {
    coordinator: Arc<GenerationCoordinator>,
    key: CacheKey,
    outcome: Option<Outcome>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(ThumbError::EncodeFailed(
                "generation aborted before completing".to_string(),
            ))
        });
        self.coordinator.release(&self.key, outcome);
    }
}

impl GenerationCoordinator {
    /// # Arguments
    ///
    /// * `workers` - Maximum number of concurrent decode/encode jobs
    /// * `timeout` - How long a single caller waits for a generation
    pub fn new(
        store: Arc<ThumbnailStore>,
        engine: Arc<ResamplingEngine>,
        file_index: Arc<dyn FileIndex>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            file_index,
            in_flight: DashMap::new(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
            generations: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Arc<ThumbnailStore> {
        &self.store
    }

    pub fn file_index(&self) -> &Arc<dyn FileIndex> {
        &self.file_index
    }

    /// Number of times the engine has been invoked.
    pub fn generation_count(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    /// Highest number of engine calls that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Number of keys currently being generated.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Looks up `file_id` and returns the path of its thumbnail, generating
    /// it if needed.
    #[instrument(skip(self, flags))]
    pub async fn get_or_create_thumbnail(
        self: &Arc<Self>,
        file_id: &str,
        width: u32,
        height: u32,
        flags: &[OptionFlag],
    ) -> ThumbResult<PathBuf> {
        validate_dimensions(width, height, self.engine.max_pixels())?;

        let file = self.file_index.lookup_file(file_id).await?;
        let spec = ThumbnailSpec {
            file_id: file_id.to_string(),
            file,
            width,
            height,
            options: ResampleOptions::resolve(flags),
        };
        self.request(spec).await
    }

    /// Returns the artifact path for `spec`, generating it on a cache miss.
    pub async fn request(self: &Arc<Self>, spec: ThumbnailSpec) -> ThumbResult<PathBuf> {
        spec.validate(self.engine.max_pixels())?;
        let key = spec.cache_key();

        if let Some(artifact) = self.store.get(&key).await {
            trace!(%key, "Cache hit");
            return Ok(artifact.path);
        }

        let (tx, rx) = oneshot::channel();
        let start = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut ticket) => {
                ticket.get_mut().push(tx);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![tx]);
                true
            }
        };

        if start {
            let mut ticket = Ticket {
                coordinator: Arc::clone(self),
                key,
                outcome: None,
            };
            let span = info_span!("generate", key = %ticket.key, file_id = %spec.file_id);
            tokio::spawn(
                async move {
                    let outcome = ticket.coordinator.generate(&ticket.key, &spec).await;
                    ticket.outcome = Some(outcome);
                }
                .instrument(span),
            );
        } else {
            debug!(%key, "Joining in-flight generation");
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ThumbError::EncodeFailed(
                "generation ended without a result".to_string(),
            )),
            Err(_) => {
                warn!(timeout = ?self.timeout, "Gave up waiting for thumbnail");
                Err(ThumbError::GenerationTimeout)
            }
        }
    }

    /// Runs one generation attempt. Waits for a worker slot first; the map
    /// lock is not held here.
    async fn generate(&self, key: &CacheKey, spec: &ThumbnailSpec) -> Outcome {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ThumbError::EncodeFailed("worker pool closed".to_string()))?;

        // A generation that finished between the caller's lookup and ticket
        // creation has already published the artifact
        if let Some(artifact) = self.store.get(key).await {
            trace!("Artifact appeared while queued");
            return Ok(artifact.path);
        }

        let source_path = spec.file.absolute_path();
        let source = tokio::fs::read(&source_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ThumbError::SourceMissing(spec.file_id.clone())
            } else {
                ThumbError::SourceCorrupt(e.to_string())
            }
        })?;

        self.generations.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(running, Ordering::SeqCst);

        let engine = Arc::clone(&self.engine);
        let job_spec = spec.clone();
        let joined = tokio::task::spawn_blocking(move || engine.generate(&job_spec, &source)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        let bytes = joined
            .map_err(|e| ThumbError::EncodeFailed(format!("generation task failed: {e}")))??;

        let artifact = self.store.put(key, spec, &bytes).await?;
        debug!(path = %artifact.path.display(), "Thumbnail generated");
        Ok(artifact.path)
    }

    /// Destroys the ticket for `key` and hands `outcome` to all its waiters.
    fn release(&self, key: &CacheKey, outcome: Outcome) {
        let waiters = self.in_flight.remove(key).map(|(_, w)| w).unwrap_or_default();
        if let Err(e) = &outcome {
            warn!(error = %e, waiters = waiters.len(), "Thumbnail generation failed");
        }
        for tx in waiters {
            // Receivers that timed out are gone
            let _ = tx.send(outcome.clone());
        }
    }
}

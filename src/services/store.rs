//! # Thumbnail Store
//!
//! Persists generated thumbnails under a sharded directory layout:
//!
//! ```text
//! <root>/<key[0..2]>/<key[2..4]>/<key>.<jpg|png>   artifact bytes
//! <root>/<key[0..2]>/<key[2..4]>/<key>.json        metadata sidecar
//! ```
//!
//! The artifact is published before its sidecar and both are written through
//! a temporary file plus rename, so a sidecar on disk always describes a
//! complete artifact. An in-memory index mirrors the sidecars; it is rebuilt
//! by [`ThumbnailStore::reconcile`] on startup and lazily filled by
//! [`ThumbnailStore::get`] otherwise.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{ThumbError, ThumbResult};
use crate::models::{CacheKey, ThumbFormat, ThumbnailArtifact, ThumbnailSpec};
use crate::services::file_index::{FileIndex, FileIndexError};
use crate::utils::{
    constant::{SIDECAR_SUFFIX, TEMP_FILE_SUFFIX},
    file::FileManager,
};

const FORMATS: [ThumbFormat; 2] = [ThumbFormat::Jpeg, ThumbFormat::Png];

/// Outcome of a startup reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub indexed: usize,
    pub removed_temp: usize,
    pub removed_orphans: usize,
}

pub struct ThumbnailStore {
    root: PathBuf,
    index: DashMap<CacheKey, ThumbnailArtifact>,
}

impl ThumbnailStore {
    /// Creates a store over `root` with an empty index. Call
    /// [`reconcile`](Self::reconcile) to load existing artifacts eagerly.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index: DashMap::new(),
        }
    }

    /// Creates the root directory if needed and reconciles it.
    pub async fn open(root: PathBuf) -> std::io::Result<Self> {
        FileManager::ensure_directory_exists(&root).await?;
        let store = Self::new(root);
        store.reconcile().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, key: &CacheKey) -> PathBuf {
        let (a, b) = key.shard();
        self.root.join(a).join(b)
    }

    pub fn artifact_path(&self, key: &CacheKey, format: ThumbFormat) -> PathBuf {
        self.shard_dir(key)
            .join(format!("{key}.{}", format.extension()))
    }

    fn sidecar_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key).join(format!("{key}{SIDECAR_SUFFIX}"))
    }

    /// Returns the artifact stored under `key`, if it is still on disk.
    pub async fn get(&self, key: &CacheKey) -> Option<ThumbnailArtifact> {
        let cached = self.index.get(key).map(|entry| entry.value().clone());
        if let Some(artifact) = cached {
            if fs::try_exists(&artifact.path).await.unwrap_or(false) {
                return Some(artifact);
            }
            warn!(%key, "Indexed artifact vanished from disk");
            self.index.remove(key);
            return None;
        }

        // Not indexed yet: another process or a previous run may have written it
        let artifact = self.load_sidecar(key, &self.sidecar_path(key)).await?;
        if !fs::try_exists(&artifact.path).await.unwrap_or(false) {
            return None;
        }
        trace!(%key, "Artifact loaded from sidecar");
        self.index.insert(key.clone(), artifact.clone());
        Some(artifact)
    }

    async fn load_sidecar(&self, key: &CacheKey, sidecar: &Path) -> Option<ThumbnailArtifact> {
        let raw = fs::read(sidecar).await.ok()?;
        match serde_json::from_slice::<ThumbnailArtifact>(&raw) {
            Ok(mut artifact) if &artifact.cache_key == key => {
                // The root may have moved since the sidecar was written
                artifact.path = self.artifact_path(key, artifact.format);
                Some(artifact)
            }
            Ok(_) => {
                warn!(%key, sidecar = %sidecar.display(), "Sidecar describes another key");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "Unreadable sidecar");
                None
            }
        }
    }

    /// Publishes `bytes` as the artifact for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ThumbError::WriteFailed`] when the disk rejects the write.
    /// Nothing is indexed in that case.
    #[instrument(skip(self, spec, bytes), fields(size = bytes.len()))]
    pub async fn put(
        &self,
        key: &CacheKey,
        spec: &ThumbnailSpec,
        bytes: &[u8],
    ) -> ThumbResult<ThumbnailArtifact> {
        let write_failed = |e: std::io::Error| ThumbError::WriteFailed(e.to_string());

        FileManager::ensure_directory_exists(&self.shard_dir(key))
            .await
            .map_err(write_failed)?;

        let format = spec.options.format;
        let artifact = ThumbnailArtifact {
            cache_key: key.clone(),
            path: self.artifact_path(key, format),
            size_bytes: bytes.len() as u64,
            created_at: OffsetDateTime::now_utc(),
            source_hash: spec.file.content_hash.clone(),
            file_id: spec.file_id.clone(),
            format,
        };

        FileManager::save_file_atomic(&artifact.path, bytes)
            .await
            .map_err(write_failed)?;

        let sidecar = serde_json::to_vec(&artifact)
            .map_err(|e| ThumbError::WriteFailed(e.to_string()))?;
        if let Err(e) = FileManager::save_file_atomic(&self.sidecar_path(key), &sidecar).await {
            FileManager::cleanup_file(&artifact.path).await;
            return Err(write_failed(e));
        }

        self.index.insert(key.clone(), artifact.clone());
        debug!(path = %artifact.path.display(), "Artifact stored");
        Ok(artifact)
    }

    /// Removes the artifact for `key`. Removing an absent key succeeds.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, key: &CacheKey) -> ThumbResult<()> {
        self.index.remove(key);

        // Sidecar first so a crash never leaves a sidecar without its artifact
        let write_failed = |e: std::io::Error| ThumbError::WriteFailed(e.to_string());
        FileManager::remove_if_exists(&self.sidecar_path(key))
            .await
            .map_err(write_failed)?;
        for format in FORMATS {
            FileManager::remove_if_exists(&self.artifact_path(key, format))
                .await
                .map_err(write_failed)?;
        }
        debug!("Artifact invalidated");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.index.iter().map(|e| e.value().size_bytes).sum()
    }

    fn snapshot(&self) -> Vec<ThumbnailArtifact> {
        self.index.iter().map(|e| e.value().clone()).collect()
    }

    /// Rebuilds the index from the sidecars on disk.
    ///
    /// Leftover temporary files are deleted, as are artifacts without a
    /// sidecar and sidecars without an artifact.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn reconcile(&self) -> std::io::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let files = collect_files(&self.root).await?;

        let mut sidecars = Vec::new();
        let mut artifacts = Vec::new();
        for path in files {
            let name = path.file_name().and_then(OsStr::to_str).unwrap_or_default();
            if name.ends_with(TEMP_FILE_SUFFIX) {
                FileManager::cleanup_file(&path).await;
                report.removed_temp += 1;
            } else if name.ends_with(SIDECAR_SUFFIX) {
                sidecars.push(path);
            } else {
                artifacts.push(path);
            }
        }

        for sidecar in sidecars {
            let key = sidecar
                .file_stem()
                .and_then(OsStr::to_str)
                .and_then(CacheKey::parse);
            let artifact = match &key {
                Some(key) => self.load_sidecar(key, &sidecar).await,
                None => None,
            };
            match artifact {
                Some(artifact) if fs::try_exists(&artifact.path).await.unwrap_or(false) => {
                    self.index.insert(artifact.cache_key.clone(), artifact);
                    report.indexed += 1;
                }
                _ => {
                    FileManager::cleanup_file(&sidecar).await;
                    report.removed_orphans += 1;
                }
            }
        }

        for path in artifacts {
            let key = path
                .file_stem()
                .and_then(OsStr::to_str)
                .and_then(CacheKey::parse);
            let indexed = key
                .and_then(|key| self.index.get(&key).map(|a| a.path == path))
                .unwrap_or(false);
            if !indexed {
                FileManager::cleanup_file(&path).await;
                report.removed_orphans += 1;
            }
        }

        info!(
            indexed = report.indexed,
            removed_temp = report.removed_temp,
            removed_orphans = report.removed_orphans,
            "Thumbnail store reconciled"
        );
        Ok(report)
    }

    /// Invalidates artifacts whose source is gone or whose content changed.
    /// Returns the number of artifacts removed.
    #[instrument(skip_all)]
    pub async fn sweep_stale(&self, file_index: &dyn FileIndex) -> usize {
        let mut current_hashes: HashMap<String, Option<String>> = HashMap::new();
        let mut removed = 0;

        for artifact in self.snapshot() {
            if !current_hashes.contains_key(&artifact.file_id) {
                let hash = match file_index.lookup_file(&artifact.file_id).await {
                    Ok(file) => Some(file.content_hash),
                    Err(FileIndexError::NotFound(_)) => None,
                    Err(e) => {
                        warn!(file_id = %artifact.file_id, error = %e, "Skipping stale check");
                        continue;
                    }
                };
                current_hashes.insert(artifact.file_id.clone(), hash);
            }

            let stale = current_hashes
                .get(&artifact.file_id)
                .is_some_and(|hash| hash.as_deref() != Some(artifact.source_hash.as_str()));
            if !stale {
                continue;
            }

            match self.invalidate(&artifact.cache_key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %artifact.cache_key, error = %e, "Failed to drop stale artifact"),
            }
        }

        if removed > 0 {
            info!(removed, "Stale thumbnails removed");
        }
        removed
    }

    /// Drops the oldest artifacts until the store fits in `max_bytes`.
    /// Returns the number of artifacts removed.
    #[instrument(skip(self))]
    pub async fn evict_to_capacity(&self, max_bytes: u64) -> usize {
        let mut artifacts = self.snapshot();
        let mut total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
        if total <= max_bytes {
            return 0;
        }

        artifacts.sort_by_key(|a| a.created_at);
        let mut removed = 0;
        for artifact in artifacts {
            if total <= max_bytes {
                break;
            }
            match self.invalidate(&artifact.cache_key).await {
                Ok(()) => {
                    total -= artifact.size_bytes;
                    removed += 1;
                }
                Err(e) => warn!(key = %artifact.cache_key, error = %e, "Failed to evict artifact"),
            }
        }

        info!(removed, total, "Thumbnail cache trimmed to capacity");
        removed
    }
}

/// Lists every regular file below `root`.
async fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !fs::try_exists(root).await? {
        return Ok(files);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}

//! # File Index
//!
//! The thumbnail core only needs two things from the photo index: resolving a
//! file id to a [`FileDescriptor`] and flagging a record whose file vanished.
//! [`FileIndex`] is that seam; [`DirectoryFileIndex`] is a local
//! implementation backed by an originals directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::ThumbError;
use crate::models::FileDescriptor;

/// Errors reported by a file index.
#[derive(Debug, Error)]
pub enum FileIndexError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileIndexError> for ThumbError {
    fn from(e: FileIndexError) -> Self {
        match e {
            FileIndexError::NotFound(id) => ThumbError::SourceMissing(id),
            FileIndexError::Io(e) => ThumbError::SourceCorrupt(e.to_string()),
        }
    }
}

#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Resolves `file_id` to the descriptor of its current content.
    async fn lookup_file(&self, file_id: &str) -> Result<FileDescriptor, FileIndexError>;

    /// Flags the record for `file_id` as missing so listings can hide it.
    async fn mark_missing(&self, file_id: &str) -> Result<(), FileIndexError>;
}

/// Content hash of an original together with the metadata it was computed
/// from.
#[derive(Debug, Clone)]
struct HashedFile {
    len: u64,
    modified: Option<SystemTime>,
    content_hash: String,
}

/// File index over a directory of originals.
///
/// File ids are paths relative to the root; the content hash is the SHA-256 of
/// the file bytes. Hashes are remembered per id and only recomputed when the
/// file's size or modification time changes, so a cache hit costs a `stat`.
///
/// Only ids that resolved at least once can be marked missing, which keeps
/// both maps bounded by the files that exist or existed under the root.
pub struct DirectoryFileIndex {
    root: PathBuf,
    hashes: DashMap<String, HashedFile>,
    missing: DashSet<String>,
}

impl DirectoryFileIndex {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            hashes: DashMap::new(),
            missing: DashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_marked_missing(&self, file_id: &str) -> bool {
        self.missing.contains(file_id)
    }

    /// Number of originals with a remembered content hash.
    pub fn known_files(&self) -> usize {
        self.hashes.len()
    }

    /// Only plain relative paths are accepted, so ids cannot escape the root.
    fn is_safe_id(file_id: &str) -> bool {
        !file_id.is_empty()
            && Path::new(file_id)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    }
}

/// Streams `path` through SHA-256. Blocking.
fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl FileIndex for DirectoryFileIndex {
    #[instrument(skip(self))]
    async fn lookup_file(&self, file_id: &str) -> Result<FileDescriptor, FileIndexError> {
        if !Self::is_safe_id(file_id) {
            warn!("Rejecting unsafe file id");
            return Err(FileIndexError::NotFound(file_id.to_string()));
        }

        let path = self.root.join(file_id);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(FileIndexError::NotFound(file_id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Original not found");
                return Err(FileIndexError::NotFound(file_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let len = metadata.len();
        let modified = metadata.modified().ok();

        let remembered = self
            .hashes
            .get(file_id)
            .filter(|known| known.len == len && known.modified == modified && modified.is_some())
            .map(|known| known.content_hash.clone());

        let content_hash = match remembered {
            Some(hash) => hash,
            None => {
                let hash_path = path.clone();
                let hash = tokio::task::spawn_blocking(move || hash_file(&hash_path))
                    .await
                    .map_err(std::io::Error::other)?
                    .map_err(|e| {
                        if e.kind() == ErrorKind::NotFound {
                            FileIndexError::NotFound(file_id.to_string())
                        } else {
                            FileIndexError::Io(e)
                        }
                    })?;
                trace!(len, "Content hash computed");
                self.hashes.insert(
                    file_id.to_string(),
                    HashedFile {
                        len,
                        modified,
                        content_hash: hash.clone(),
                    },
                );
                hash
            }
        };

        if self.missing.remove(file_id).is_some() {
            info!("Previously missing file is back");
        }

        Ok(FileDescriptor {
            root: self.root.clone(),
            relative_path: file_id.to_string(),
            content_hash,
        })
    }

    #[instrument(skip(self))]
    async fn mark_missing(&self, file_id: &str) -> Result<(), FileIndexError> {
        if self.hashes.remove(file_id).is_none() {
            debug!("Ignoring missing report for a file that never resolved");
            return Ok(());
        }
        info!("Marking file as missing");
        self.missing.insert(file_id.to_string());
        Ok(())
    }
}

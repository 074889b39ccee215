use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::{CacheKey, ThumbFormat};

/// A generated thumbnail as persisted by the store. Never mutated after it is
/// written; replaced only by invalidating and regenerating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailArtifact {
    pub cache_key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: OffsetDateTime,
    pub source_hash: String,
    /// File id the artifact was generated for; used by the stale sweep.
    pub file_id: String,
    pub format: ThumbFormat,
}

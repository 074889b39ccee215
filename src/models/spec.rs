use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ThumbError, ThumbResult};
use crate::models::ResampleOptions;

/// Version tag of the canonical key form. Bump to orphan every existing
/// artifact when the form changes.
const CACHE_KEY_VERSION: &str = "thumbkeep/v1";

/// Identity of a decodable source image, as handed out by the file index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub root: PathBuf,
    pub relative_path: String,
    pub content_hash: String,
}

impl FileDescriptor {
    pub fn absolute_path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }
}

/// The full shape of a thumbnail request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailSpec {
    pub file_id: String,
    pub file: FileDescriptor,
    pub width: u32,
    pub height: u32,
    pub options: ResampleOptions,
}

impl ThumbnailSpec {
    /// Rejects zero-sized boxes and boxes larger than `max_pixels`.
    pub fn validate(&self, max_pixels: u64) -> ThumbResult<()> {
        validate_dimensions(self.width, self.height, max_pixels)
    }

    /// Canonical serialization with a fixed field order.
    ///
    /// Fields are newline separated. The content hash comes from the file
    /// index and is hashed byte for byte behind a length prefix; the other
    /// fields are integers and fixed enum names.
    pub fn canonical_form(&self) -> String {
        format!(
            "{CACHE_KEY_VERSION}\nsource={}:{}\nwidth={}\nheight={}\nmethod={}\nfilter={}\nformat={}",
            self.file.content_hash.len(),
            self.file.content_hash,
            self.width,
            self.height,
            self.options.method.name(),
            self.options.filter.name(),
            self.options.format.extension(),
        )
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self)
    }
}

pub fn validate_dimensions(width: u32, height: u32, max_pixels: u64) -> ThumbResult<()> {
    if width == 0 || height == 0 {
        return Err(ThumbError::DimensionsInvalid(format!(
            "width and height must be positive, got {width}x{height}"
        )));
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(ThumbError::DimensionsInvalid(format!(
            "{width}x{height} exceeds the limit of {max_pixels} pixels"
        )));
    }
    Ok(())
}

/// Hex encoded SHA-256 of a spec's canonical form (64 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub const LEN: usize = 64;

    pub fn derive(spec: &ThumbnailSpec) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(spec.canonical_form().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Accepts a previously derived key, e.g. read back from a sidecar file.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == Self::LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-level directory shard, e.g. `ab/cd` for `abcd...`.
    pub fn shard(&self) -> (&str, &str) {
        (&self.0[0..2], &self.0[2..4])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

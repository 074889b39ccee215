//! # Application Constants
//!
//! Default values for the tunables in [`ServiceConfig`](crate::utils::config::ServiceConfig).

use std::time::Duration;

/// Largest accepted target box, in pixels (`width * height`).
///
/// Bounds the memory a single request can make the encoder allocate.
pub const DEFAULT_MAX_PIXELS: u64 = 4096 * 4096;

/// Largest accepted source edge. Sources beyond this are refused by the
/// decoder before any pixel buffer is allocated.
pub const DEFAULT_MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Number of generations allowed to decode/encode at the same time.
pub const DEFAULT_WORKERS: usize = 4;

/// How long a caller waits on a generation before giving up
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// JPEG quality used for every lossy thumbnail
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Disk budget for the thumbnail cache; oldest artifacts are evicted beyond it.
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Interval of the background stale sweep and capacity eviction.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";

/// Suffix of in-progress writes inside the cache directory.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Suffix of artifact metadata sidecars.
pub const SIDECAR_SUFFIX: &str = ".json";

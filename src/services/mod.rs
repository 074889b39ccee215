//! # Thumbnail Services
//!
//! ## Available Services
//!
//! - **Resample** (`resample`) - Decode, crop/fit/resize and encode
//! - **Store** (`store`) - Sharded on-disk artifact cache
//! - **Coordinator** (`coordinator`) - Per-key deduplicated generation
//! - **Fallback** (`fallback`) - Placeholder images for failed requests
//! - **File index** (`file_index`) - Source lookup seam and directory implementation

pub mod coordinator;
pub mod fallback;
pub mod file_index;
pub mod resample;
pub mod store;

//! # HTTP Request Handlers
//!
//! - **Health Check** (`health_check`) - Liveness probe
//! - **Thumbnail** (`thumbnail`) - Thumbnail serving with placeholder fallback

mod health_check;
mod thumbnail;

pub use health_check::*;
pub use thumbnail::*;

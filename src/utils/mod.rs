//! # Utility Modules
//!
//! - **Constants** (`constant`) - Default tunables
//! - **Config** (`config`) - Environment-driven service configuration
//! - **File** (`file`) - Atomic writes and idempotent removal

pub mod config;
pub mod constant;
pub mod file;

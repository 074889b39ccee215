//! # Service Configuration
//!
//! Everything the core needs is collected once into [`ServiceConfig`] and then
//! handed to constructors; nothing below `main` reads the environment.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{error, info};

use crate::utils::constant::*;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding generated thumbnails.
    pub cache_dir: PathBuf,
    /// Directory of original images served by the default file index.
    pub originals_dir: PathBuf,
    pub max_pixels: u64,
    pub max_source_dimension: u32,
    pub workers: usize,
    pub generation_timeout: Duration,
    pub jpeg_quality: u8,
    pub cache_max_bytes: u64,
    pub sweep_interval: Duration,
    pub bind_addr: String,
    /// Shared secret embedded in thumbnail URLs.
    pub preview_token: String,
}

impl ServiceConfig {
    /// Config rooted at the given directories with default tunables.
    pub fn new(cache_dir: PathBuf, originals_dir: PathBuf, preview_token: String) -> Self {
        Self {
            cache_dir,
            originals_dir,
            max_pixels: DEFAULT_MAX_PIXELS,
            max_source_dimension: DEFAULT_MAX_SOURCE_DIMENSION,
            workers: DEFAULT_WORKERS,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            preview_token,
        }
    }

    /// Reads the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `THUMB_CACHE_DIR` - Thumbnail cache directory (default `./cache/thumbnails`)
    /// - `ORIGINALS_DIR` - Originals directory (default `./originals`)
    /// - `THUMB_MAX_PIXELS`, `THUMB_MAX_SOURCE_DIMENSION`, `THUMB_WORKERS`,
    ///   `THUMB_TIMEOUT_SECS`, `THUMB_JPEG_QUALITY`, `THUMB_CACHE_MAX_BYTES`,
    ///   `THUMB_SWEEP_INTERVAL_SECS`, `BIND_ADDR` - Tunables
    /// - `PREVIEW_TOKEN_FILE` or `PREVIEW_TOKEN` - URL token
    ///
    /// Invalid or missing values are logged and replaced by defaults.
    pub fn from_env() -> Self {
        let preview_token = get_secret("PREVIEW_TOKEN_FILE", "PREVIEW_TOKEN").unwrap_or_else(|| {
            error!("Missing PREVIEW_TOKEN env var, using fallback 'public'");
            "public".to_string()
        });

        let config = Self {
            cache_dir: env_or("THUMB_CACHE_DIR", PathBuf::from("./cache/thumbnails")),
            originals_dir: env_or("ORIGINALS_DIR", PathBuf::from("./originals")),
            max_pixels: env_or("THUMB_MAX_PIXELS", DEFAULT_MAX_PIXELS),
            max_source_dimension: env_or(
                "THUMB_MAX_SOURCE_DIMENSION",
                DEFAULT_MAX_SOURCE_DIMENSION,
            ),
            workers: env_or("THUMB_WORKERS", DEFAULT_WORKERS).max(1),
            generation_timeout: Duration::from_secs(env_or(
                "THUMB_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT.as_secs(),
            )),
            jpeg_quality: env_or("THUMB_JPEG_QUALITY", DEFAULT_JPEG_QUALITY).clamp(1, 100),
            cache_max_bytes: env_or("THUMB_CACHE_MAX_BYTES", DEFAULT_CACHE_MAX_BYTES),
            sweep_interval: Duration::from_secs(
                env_or("THUMB_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL.as_secs()).max(1),
            ),
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR.to_string()),
            preview_token,
        };

        info!(
            cache_dir = %config.cache_dir.display(),
            originals_dir = %config.originals_dir.display(),
            workers = config.workers,
            "Configuration loaded"
        );
        config
    }
}

fn env_or<T>(name: &str, fallback: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(val) => val.parse().unwrap_or_else(|_| {
            error!("Invalid {name} env var {val:?}, using fallback {fallback:?}");
            fallback
        }),
        Err(_) => fallback,
    }
}

/// Reads a secret from the file named by `file_env_var_name`, or from
/// `env_var_name` directly when no file is configured.
pub fn get_secret(file_env_var_name: &str, env_var_name: &str) -> Option<String> {
    if let Ok(secret_file_path) = env::var(file_env_var_name) {
        match fs::read_to_string(&secret_file_path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                error!(%secret_file_path, ?e, "Error reading secret file");
                None
            }
        }
    } else {
        env::var(env_var_name).ok()
    }
}

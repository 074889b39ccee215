#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use sha2::{Digest, Sha256};
use thumbkeep::{
    models::FileDescriptor,
    services::{
        coordinator::GenerationCoordinator,
        file_index::{FileIndex, FileIndexError},
        resample::ResamplingEngine,
        store::ThumbnailStore,
    },
    utils::config::ServiceConfig,
};
use tokio::net::TcpListener;

pub const TEST_TOKEN: &str = "preview-secret";

pub fn init_tracing_once() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("thumbkeep=debug")
            .with_test_writer()
            .init();
    });
}

/// A file index that serves registered records and remembers which ones were
/// flagged as missing. Records keep pointing at their file after it is
/// deleted, like a stale database row would.
#[derive(Debug, Default)]
pub struct MockFileIndex {
    records: Mutex<HashMap<String, FileDescriptor>>,
    marked_missing: Mutex<Vec<String>>,
}

impl MockFileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `root/file_id`, hashing its current content.
    pub fn register(&self, root: &Path, file_id: &str) -> FileDescriptor {
        let data = std::fs::read(root.join(file_id)).expect("Failed to read registered file");
        let descriptor = FileDescriptor {
            root: root.to_path_buf(),
            relative_path: file_id.to_string(),
            content_hash: format!("{:x}", Sha256::digest(&data)),
        };
        self.records
            .lock()
            .unwrap()
            .insert(file_id.to_string(), descriptor.clone());
        descriptor
    }

    pub fn marked_missing(&self) -> Vec<String> {
        self.marked_missing.lock().unwrap().clone()
    }

    /// Polls until `file_id` was flagged, since the flag is set from a
    /// detached task.
    pub async fn wait_marked_missing(&self, file_id: &str) -> bool {
        for _ in 0..50 {
            if self.marked_missing().iter().any(|id| id == file_id) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

#[async_trait]
impl FileIndex for MockFileIndex {
    async fn lookup_file(&self, file_id: &str) -> Result<FileDescriptor, FileIndexError> {
        self.records
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| FileIndexError::NotFound(file_id.to_string()))
    }

    async fn mark_missing(&self, file_id: &str) -> Result<(), FileIndexError> {
        self.marked_missing
            .lock()
            .unwrap()
            .push(file_id.to_string());
        Ok(())
    }
}

/// Temporary originals and cache directories for one test.
pub struct TestDirs {
    _tmp: tempfile::TempDir,
    pub originals: PathBuf,
    pub cache: PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let originals = tmp.path().join("originals");
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&originals).unwrap();
        Self {
            _tmp: tmp,
            originals,
            cache,
        }
    }

    pub fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(
            self.cache.clone(),
            self.originals.clone(),
            TEST_TOKEN.to_string(),
        );
        config.max_pixels = 1_000_000;
        config.workers = 2;
        config
    }

    /// Writes `data` as `originals/file_id`, creating parent directories.
    pub fn write_original(&self, file_id: &str, data: &[u8]) -> PathBuf {
        let path = self.originals.join(file_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }
}

pub fn coordinator(
    config: &ServiceConfig,
    file_index: Arc<dyn FileIndex>,
) -> Arc<GenerationCoordinator> {
    let store = Arc::new(ThumbnailStore::new(config.cache_dir.clone()));
    let engine = Arc::new(ResamplingEngine::new(
        config.max_pixels,
        config.max_source_dimension,
        config.jpeg_quality,
    ));
    Arc::new(GenerationCoordinator::new(
        store,
        engine,
        file_index,
        config.workers,
        config.generation_timeout,
    ))
}

/// Encodes a `width`x`height` gradient in `format`.
pub fn test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), format)
        .expect("Failed to encode test image");
    buffer
}

/// Spawns the application and returns its address.
///
/// Returned address format: `http://127.0.0.1:8492`
pub async fn spawn_app(config: ServiceConfig, file_index: Arc<dyn FileIndex>) -> String {
    init_tracing_once();

    let app = thumbkeep::app_with_file_index(config, file_index)
        .await
        .expect("Failed to build app");

    // Randomly choose an available port
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port at localhost");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let address = format!("http://127.0.0.1:{port}");

    // Wait for server to be ready
    let client = reqwest::Client::new();
    for _ in 0..10 {
        if client
            .get(format!("{address}/health-check"))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    address
}

pub fn thumbnail_url(address: &str, token: &str, file_id: &str, query: &str) -> String {
    format!("{address}/api/thumbnails/{token}/{file_id}?{query}")
}

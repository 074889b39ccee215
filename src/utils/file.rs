//! # File Utilities
//!
//! Small async file system helpers shared by the thumbnail store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, error, trace};

use crate::utils::constant::TEMP_FILE_SUFFIX;

pub struct FileManager;

impl FileManager {
    /// Ensures the specified directory exists, creating it if necessary.
    pub async fn ensure_directory_exists(path: &Path) -> Result<(), std::io::Error> {
        trace!(path = %path.display(), "Ensuring directory exists");
        fs::create_dir_all(path).await
    }

    /// Writes `data` to a unique temporary sibling of `file_path`, then
    /// renames it into place.
    ///
    /// Readers see either no file or the complete file. On failure the
    /// temporary file is removed.
    pub async fn save_file_atomic(file_path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
        debug!(file_path = %file_path.display(), size = data.len(), "Saving file");

        let tmp_path = Self::temp_path_for(file_path);
        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, file_path).await
        }
        .await;

        if result.is_err() {
            Self::cleanup_file(&tmp_path).await;
        } else {
            debug!(file_path = %file_path.display(), "File saved successfully");
        }
        result
    }

    /// Removes a file, treating "already gone" as success.
    pub async fn remove_if_exists(file_path: &Path) -> Result<(), std::io::Error> {
        match fs::remove_file(file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Attempts to clean up a file during error recovery. Errors are logged,
    /// not returned, so the original error is preserved.
    pub async fn cleanup_file(file_path: &Path) {
        if let Err(e) = Self::remove_if_exists(file_path).await {
            error!(
                file_path = %file_path.display(),
                error = %e,
                "Failed to clean up file during error recovery"
            );
        } else {
            debug!(file_path = %file_path.display(), "File cleaned up successfully");
        }
    }

    fn temp_path_for(file_path: &Path) -> PathBuf {
        let mut name = file_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}{TEMP_FILE_SUFFIX}", uuid::Uuid::new_v4().simple()));
        file_path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");

        FileManager::save_file_atomic(&target, b"first").await.unwrap();
        FileManager::save_file_atomic(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.bin");

        assert!(FileManager::save_file_atomic(&target, b"x").await.is_err());
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.bin");
        FileManager::remove_if_exists(&target).await.unwrap();
        std::fs::write(&target, b"x").unwrap();
        FileManager::remove_if_exists(&target).await.unwrap();
        assert!(!target.exists());
    }
}

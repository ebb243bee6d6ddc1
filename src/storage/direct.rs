//! Direct-path storage backend: destinations are plain files under a root
//! directory, visible as soon as they are created.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tracing::debug;

use super::error::StorageError;
use super::{HandleState, StorageBackend, WriteHandle};

/// Writes destinations straight into a root directory.
#[derive(Debug)]
pub struct DirectBackend {
    root: PathBuf,
    /// Fixed free-space figure for tests and capacity simulations; when
    /// unset the filesystem is probed.
    fixed_available_space: Option<u64>,
}

impl DirectBackend {
    /// Creates a backend rooted at `root`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the root cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self {
            root,
            fixed_available_space: None,
        })
    }

    /// Like [`new`](Self::new), but reporting a fixed free-space figure
    /// instead of probing the filesystem.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the root cannot be created.
    pub fn with_fixed_available_space(
        root: impl Into<PathBuf>,
        bytes: u64,
    ) -> Result<Self, StorageError> {
        let mut backend = Self::new(root)?;
        backend.fixed_available_space = Some(bytes);
        Ok(backend)
    }

    /// The root directory destinations are placed under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageBackend for DirectBackend {
    async fn entry_exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.root.join(name);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn create_exclusive(&self, name: &str) -> Result<WriteHandle, StorageError> {
        let path = self.root.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!(path = %path.display(), "created destination");
        Ok(WriteHandle::open(name.to_string(), path, file))
    }

    async fn finalize(&self, handle: &mut WriteHandle) -> Result<PathBuf, StorageError> {
        match handle.state() {
            HandleState::Finalized => Ok(handle.path().to_path_buf()),
            HandleState::Aborted => Err(StorageError::HandleClosed),
            HandleState::Open => {
                if let Some(file) = handle.take_file() {
                    file.sync_all()
                        .await
                        .map_err(|e| StorageError::io(handle.path(), e))?;
                }
                handle.mark(HandleState::Finalized, None);
                Ok(handle.path().to_path_buf())
            }
        }
    }

    async fn abort(&self, handle: &mut WriteHandle) -> Result<(), StorageError> {
        match handle.state() {
            // Nothing to roll back once published, and a second abort is
            // a no-op.
            HandleState::Finalized | HandleState::Aborted => Ok(()),
            HandleState::Open => {
                drop(handle.take_file());
                let path = handle.path().to_path_buf();
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::io(path, e)),
                }
                handle.mark(HandleState::Aborted, None);
                Ok(())
            }
        }
    }

    fn available_space(&self) -> Result<u64, StorageError> {
        if let Some(fixed) = self.fixed_available_space {
            return Ok(fixed);
        }
        fs2::available_space(&self.root).map_err(|e| StorageError::io(&self.root, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn backend() -> (TempDir, DirectBackend) {
        let dir = TempDir::new().unwrap();
        let backend = DirectBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_create_write_finalize() {
        let (_dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        handle.writer().unwrap().write_all(b"payload").await.unwrap();

        let path = backend.finalize(&mut handle).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert_eq!(handle.state(), HandleState::Finalized);
    }

    #[tokio::test]
    async fn test_create_exclusive_rejects_collision() {
        let (_dir, backend) = backend();
        let _first = backend.create_exclusive("clip.mp4").await.unwrap();
        let second = backend.create_exclusive("clip.mp4").await;
        assert!(matches!(second, Err(StorageError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_entry_exists_sees_created_file() {
        let (_dir, backend) = backend();
        assert!(!backend.entry_exists("clip.mp4").await.unwrap());
        let _handle = backend.create_exclusive("clip.mp4").await.unwrap();
        assert!(backend.entry_exists("clip.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_abort_removes_partial_file() {
        let (dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        handle.writer().unwrap().write_all(b"partial").await.unwrap();

        backend.abort(&mut handle).await.unwrap();
        assert!(!dir.path().join("clip.mp4").exists());
        assert_eq!(handle.state(), HandleState::Aborted);
        // Idempotent.
        backend.abort(&mut handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let (_dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        let first = backend.finalize(&mut handle).await.unwrap();
        let second = backend.finalize(&mut handle).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_finalize_after_abort_fails() {
        let (_dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        backend.abort(&mut handle).await.unwrap();
        assert!(matches!(
            backend.finalize(&mut handle).await,
            Err(StorageError::HandleClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_unusable_after_finalize() {
        let (_dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        backend.finalize(&mut handle).await.unwrap();
        assert!(matches!(handle.writer(), Err(StorageError::HandleClosed)));
    }

    #[tokio::test]
    async fn test_fixed_available_space_override() {
        let dir = TempDir::new().unwrap();
        let backend = DirectBackend::with_fixed_available_space(dir.path(), 1234).unwrap();
        assert_eq!(backend.available_space().unwrap(), 1234);
    }

    #[tokio::test]
    async fn test_real_available_space_probes_filesystem() {
        let (_dir, backend) = backend();
        assert!(backend.available_space().unwrap() > 0);
    }
}

//! Broker-mediated content store backend.
//!
//! Models a content store where entries are registered with a broker
//! before their bytes exist: a new destination is staged under a pending
//! area plus a content-index entry, and becomes visible at its public path
//! only when finalized. Aborting releases both the staged bytes and the
//! index entry, so a cancelled run never leaves an invisible placeholder
//! behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tracing::debug;

use super::error::StorageError;
use super::{HandleState, StorageBackend, WriteHandle};

/// Directory under the public root holding pending staged entries.
const STAGING_DIR: &str = ".pending";

/// Content index: the broker's view of which names are taken.
#[derive(Debug, Default)]
struct ContentIndex {
    published: HashSet<String>,
    pending: HashSet<String>,
}

impl ContentIndex {
    fn is_taken(&self, name: &str) -> bool {
        self.published.contains(name) || self.pending.contains(name)
    }
}

/// Content-store backend staging writes as pending entries.
#[derive(Debug)]
pub struct BrokeredBackend {
    public_dir: PathBuf,
    staging_dir: PathBuf,
    index: Mutex<ContentIndex>,
    fixed_available_space: Option<u64>,
}

impl BrokeredBackend {
    /// Creates a backend publishing into `public_dir`, seeding the content
    /// index from the entries already present there.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the directories cannot be created or listed.
    pub fn new(public_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let public_dir = public_dir.into();
        let staging_dir = public_dir.join(STAGING_DIR);
        std::fs::create_dir_all(&staging_dir).map_err(|e| StorageError::io(&staging_dir, e))?;

        let mut published = HashSet::new();
        let entries =
            std::fs::read_dir(&public_dir).map_err(|e| StorageError::io(&public_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&public_dir, e))?;
            if entry.path().is_file() {
                published.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(Self {
            public_dir,
            staging_dir,
            index: Mutex::new(ContentIndex {
                published,
                pending: HashSet::new(),
            }),
            fixed_available_space: None,
        })
    }

    /// Like [`new`](Self::new), but reporting a fixed free-space figure
    /// instead of probing the filesystem.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the directories cannot be created or listed.
    pub fn with_fixed_available_space(
        public_dir: impl Into<PathBuf>,
        bytes: u64,
    ) -> Result<Self, StorageError> {
        let mut backend = Self::new(public_dir)?;
        backend.fixed_available_space = Some(bytes);
        Ok(backend)
    }

    /// The directory finalized entries are published into.
    #[must_use]
    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Number of staged entries that have not been finalized or aborted.
    /// Zero after every orderly shutdown.
    #[must_use]
    pub fn pending_entries(&self) -> usize {
        self.index.lock().map_or(0, |index| index.pending.len())
    }

    fn index_reserve(&self, name: &str) -> Result<(), StorageError> {
        let Ok(mut index) = self.index.lock() else {
            return Err(StorageError::HandleClosed);
        };
        if index.is_taken(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }
        index.pending.insert(name.to_string());
        Ok(())
    }

    fn index_release(&self, name: &str) {
        if let Ok(mut index) = self.index.lock() {
            index.pending.remove(name);
        }
    }

    fn index_publish(&self, name: &str) {
        if let Ok(mut index) = self.index.lock() {
            index.pending.remove(name);
            index.published.insert(name.to_string());
        }
    }
}

#[async_trait]
impl StorageBackend for BrokeredBackend {
    async fn entry_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.index
            .lock()
            .map(|index| index.is_taken(name))
            .map_err(|_| StorageError::HandleClosed)
    }

    async fn create_exclusive(&self, name: &str) -> Result<WriteHandle, StorageError> {
        // Reserving the index entry is the atomic allocate-or-fail step;
        // the staged file is created only after the name is ours.
        self.index_reserve(name)?;

        let staged = self.staging_dir.join(name);
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                self.index_release(name);
                return Err(StorageError::io(&staged, e));
            }
        };
        debug!(name, staged = %staged.display(), "staged pending entry");
        Ok(WriteHandle::open(name.to_string(), staged, file))
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
                let public = self.public_dir.join(handle.name());
                tokio::fs::rename(handle.path(), &public)
                    .await
                    .map_err(|e| StorageError::io(&public, e))?;
                self.index_publish(handle.name());
                debug!(name = handle.name(), path = %public.display(), "published entry");
                handle.mark(HandleState::Finalized, Some(public.clone()));
                Ok(public)
            }
        }
    }

    async fn abort(&self, handle: &mut WriteHandle) -> Result<(), StorageError> {
        match handle.state() {
            HandleState::Finalized | HandleState::Aborted => Ok(()),
            HandleState::Open => {
                drop(handle.take_file());
                let staged = handle.path().to_path_buf();
                match tokio::fs::remove_file(&staged).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        self.index_release(handle.name());
                        return Err(StorageError::io(staged, e));
                    }
                }
                self.index_release(handle.name());
                debug!(name = handle.name(), "released pending entry");
                handle.mark(HandleState::Aborted, None);
                Ok(())
            }
        }
    }

    fn available_space(&self) -> Result<u64, StorageError> {
        if let Some(fixed) = self.fixed_available_space {
            return Ok(fixed);
        }
        fs2::available_space(&self.public_dir).map_err(|e| StorageError::io(&self.public_dir, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn backend() -> (TempDir, BrokeredBackend) {
        let dir = TempDir::new().unwrap();
        let backend = BrokeredBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_staged_entry_invisible_until_finalized() {
        let (dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        handle.writer().unwrap().write_all(b"payload").await.unwrap();

        // Not yet at the public path.
        assert!(!dir.path().join("clip.mp4").exists());
        assert_eq!(backend.pending_entries(), 1);

        let path = backend.finalize(&mut handle).await.unwrap();
        assert_eq!(path, dir.path().join("clip.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert_eq!(backend.pending_entries(), 0);
    }

    #[tokio::test]
    async fn test_pending_entry_blocks_reuse() {
        let (_dir, backend) = backend();
        let _pending = backend.create_exclusive("clip.mp4").await.unwrap();
        assert!(backend.entry_exists("clip.mp4").await.unwrap());
        assert!(matches!(
            backend.create_exclusive("clip.mp4").await,
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_abort_releases_staged_entry() {
        let (dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        handle.writer().unwrap().write_all(b"partial").await.unwrap();

        backend.abort(&mut handle).await.unwrap();

        assert_eq!(backend.pending_entries(), 0);
        assert!(!dir.path().join("clip.mp4").exists());
        assert!(!dir.path().join(STAGING_DIR).join("clip.mp4").exists());
        // The name is free again.
        let _reuse = backend.create_exclusive("clip.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_index_seeded_from_existing_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("existing.mp4"), b"old").unwrap();

        let backend = BrokeredBackend::new(dir.path()).unwrap();
        assert!(backend.entry_exists("existing.mp4").await.unwrap());
        assert!(matches!(
            backend.create_exclusive("existing.mp4").await,
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let (_dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        let first = backend.finalize(&mut handle).await.unwrap();
        let second = backend.finalize(&mut handle).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.pending_entries(), 0);
    }

    #[tokio::test]
    async fn test_finalized_path_points_at_public_entry() {
        let (dir, backend) = backend();
        let mut handle = backend.create_exclusive("clip.mp4").await.unwrap();
        backend.finalize(&mut handle).await.unwrap();
        assert_eq!(handle.path(), dir.path().join("clip.mp4"));
    }
}

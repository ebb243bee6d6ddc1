//! Destination allocation, staging, and finalization.
//!
//! Two incompatible filesystem access models hide behind one
//! [`StorageBackend`] trait, selected once at startup by [`StorageMode`]:
//!
//! - [`DirectBackend`] writes straight to destination paths.
//! - [`BrokeredBackend`] models a broker-mediated content store: writes are
//!   staged as pending entries and only become visible to the outside world
//!   after finalization.
//!
//! [`StorageService`] layers the placement policy on top: free-space
//! gating with a safety buffer, name sanitization, and race-free collision
//! resolution built on the backend's allocate-or-fail primitive.

mod direct;
mod error;
mod name;
mod service;
mod staged;

pub use direct::DirectBackend;
pub use error::StorageError;
pub use name::build_output_name;
pub use service::{StorageMode, StorageService};
pub use staged::BrokeredBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;

/// Lifecycle of a write handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Writable; the destination is reserved but not yet published.
    Open,
    /// Published; the destination is visible at its final path.
    Finalized,
    /// Released; any staged entry has been cleaned up.
    Aborted,
}

/// A reserved destination plus its open file.
///
/// Exactly one handle exists per orchestrator run. Creating the handle *is*
/// the collision probe: the backend's exclusive-create either reserves the
/// name or fails, so two runs can never hold the same destination.
#[derive(Debug)]
pub struct WriteHandle {
    name: String,
    path: PathBuf,
    file: Option<File>,
    state: HandleState,
}

impl WriteHandle {
    pub(crate) fn open(name: String, path: PathBuf, file: File) -> Self {
        Self {
            name,
            path,
            file: Some(file),
            state: HandleState::Open,
        }
    }

    /// The allocated (unique, sanitized) destination name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path currently backing this handle: the staging path while
    /// open under a brokered backend, the final path once finalized.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// The open file for streaming writes.
    ///
    /// # Errors
    ///
    /// [`StorageError::HandleClosed`] after finalize or abort.
    pub fn writer(&mut self) -> Result<&mut File, StorageError> {
        self.file.as_mut().ok_or(StorageError::HandleClosed)
    }

    pub(crate) fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }

    pub(crate) fn mark(&mut self, state: HandleState, path: Option<PathBuf>) {
        self.state = state;
        if let Some(path) = path {
            self.path = path;
        }
    }
}

/// Backing store abstraction: exclusive creation, existence probing, and
/// the publish/rollback protocol.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Whether `name` is already taken in this store (published entries
    /// and, for brokered stores, pending staged entries).
    async fn entry_exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Reserves `name` and opens it for writing, failing with
    /// [`StorageError::AlreadyExists`] if taken. This is the atomic
    /// allocate-or-fail primitive; callers never probe-then-create.
    async fn create_exclusive(&self, name: &str) -> Result<WriteHandle, StorageError>;

    /// Publishes the destination and returns its final path. Idempotent:
    /// finalizing a finalized handle returns the same path again.
    async fn finalize(&self, handle: &mut WriteHandle) -> Result<PathBuf, StorageError>;

    /// Rolls the destination back, releasing any staged entry so nothing
    /// survives as an invisible placeholder. Idempotent; a no-op on a
    /// finalized handle.
    async fn abort(&self, handle: &mut WriteHandle) -> Result<(), StorageError>;

    /// Free space available to this store, in bytes.
    fn available_space(&self) -> Result<u64, StorageError>;
}

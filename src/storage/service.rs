//! Storage placement policy over a selected backend.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::error::StorageError;
use super::name::{sanitize_logical_name, with_suffix};
use super::{BrokeredBackend, DirectBackend, StorageBackend, WriteHandle};

/// Upper bound on numeric collision suffixes before falling back to a
/// timestamped name. Keeps the probe loop finite even against a
/// pathological directory.
const MAX_SUFFIX_PROBES: u64 = 1000;

/// Which filesystem access model backs the store. Resolved once at
/// startup from the platform capability, never branched on at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Plain destination paths.
    Direct,
    /// Broker-mediated content store with pending/published staging.
    Brokered,
}

/// Allocates, finalizes, and rolls back destinations for downloads.
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    safety_buffer: u64,
}

impl StorageService {
    /// Creates a service over the backend selected by `mode`, rooted at
    /// `root`.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backing directories cannot be prepared.
    pub fn new(
        mode: StorageMode,
        root: impl Into<PathBuf>,
        safety_buffer: u64,
    ) -> Result<Self, StorageError> {
        let backend: Arc<dyn StorageBackend> = match mode {
            StorageMode::Direct => Arc::new(DirectBackend::new(root)?),
            StorageMode::Brokered => Arc::new(BrokeredBackend::new(root)?),
        };
        Ok(Self {
            backend,
            safety_buffer,
        })
    }

    /// Creates a service over an explicit backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StorageBackend>, safety_buffer: u64) -> Self {
        Self {
            backend,
            safety_buffer,
        }
    }

    /// The configured free-space safety buffer.
    #[must_use]
    pub fn safety_buffer(&self) -> u64 {
        self.safety_buffer
    }

    /// Whether `required_bytes` plus the safety buffer fits in the free
    /// space currently available to the backing store.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when free space cannot be determined.
    pub fn has_space(&self, required_bytes: u64) -> Result<bool, StorageError> {
        let available = self.backend.available_space()?;
        Ok(available >= required_bytes.saturating_add(self.safety_buffer))
    }

    /// Resolves a collision-free name for `candidate`.
    ///
    /// The candidate is sanitized first; an already-unique name is
    /// returned unchanged. Collisions append `_2`, `_3`, ... before the
    /// extension, each iteration probing a strictly new candidate.
    ///
    /// Note: the name may be taken between this probe and a later create;
    /// [`allocate`](Self::allocate) is the race-free path.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backing store cannot be probed.
    pub async fn unique_name(&self, candidate: &str) -> Result<String, StorageError> {
        let base = sanitize_logical_name(candidate);
        if !self.backend.entry_exists(&base).await? {
            return Ok(base);
        }
        for suffix in 2..=MAX_SUFFIX_PROBES {
            let next = with_suffix(&base, suffix);
            if !self.backend.entry_exists(&next).await? {
                return Ok(next);
            }
        }
        Ok(timestamped(&base))
    }

    /// Allocates a writable destination for `logical_name`.
    ///
    /// Free space is gated before any filesystem work: when
    /// `estimated_bytes` plus the safety buffer does not fit, the
    /// allocation fails with [`StorageError::InsufficientSpace`] and no
    /// write handle is created. The collision loop drives the backend's
    /// exclusive-create, so the probe and the reservation are one atomic
    /// step even across concurrent allocators.
    ///
    /// # Errors
    ///
    /// [`StorageError::InsufficientSpace`], or any backend failure.
    #[instrument(skip(self))]
    pub async fn allocate(
        &self,
        logical_name: &str,
        estimated_bytes: Option<u64>,
    ) -> Result<WriteHandle, StorageError> {
        let required = estimated_bytes.unwrap_or(0);
        let available = self.backend.available_space()?;
        if available < required.saturating_add(self.safety_buffer) {
            warn!(required, available, buffer = self.safety_buffer, "allocation rejected");
            return Err(StorageError::InsufficientSpace {
                required,
                buffer: self.safety_buffer,
                available,
            });
        }

        let base = sanitize_logical_name(logical_name);
        let mut candidate = base.clone();
        let mut suffix = 2u64;
        loop {
            match self.backend.create_exclusive(&candidate).await {
                Ok(handle) => {
                    debug!(name = %candidate, "destination allocated");
                    return Ok(handle);
                }
                Err(StorageError::AlreadyExists { .. }) if suffix <= MAX_SUFFIX_PROBES => {
                    candidate = with_suffix(&base, suffix);
                    suffix += 1;
                }
                Err(StorageError::AlreadyExists { .. }) => {
                    // Last resort: a timestamped name, tried exactly once.
                    candidate = timestamped(&base);
                    return self.backend.create_exclusive(&candidate).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Publishes the destination; idempotent.
    ///
    /// # Errors
    ///
    /// [`StorageError`] from the backend, or [`StorageError::HandleClosed`]
    /// when the handle was aborted.
    pub async fn finalize(&self, handle: &mut WriteHandle) -> Result<PathBuf, StorageError> {
        self.backend.finalize(handle).await
    }

    /// Rolls the destination back; idempotent.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the staged entry cannot be released.
    pub async fn abort(&self, handle: &mut WriteHandle) -> Result<(), StorageError> {
        self.backend.abort(handle).await
    }
}

/// Appends a Unix-epoch timestamp to the stem.
fn timestamped(name: &str) -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    with_suffix(name, secs)
}

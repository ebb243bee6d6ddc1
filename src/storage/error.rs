//! Error types for storage placement.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors crossing the storage boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The free-space gate rejected the allocation before any filesystem
    /// work happened.
    #[error(
        "insufficient storage: {required} bytes requested plus {buffer} byte safety buffer, \
         only {available} available"
    )]
    InsufficientSpace {
        /// Estimated payload size.
        required: u64,
        /// Configured safety buffer.
        buffer: u64,
        /// Free space observed at the gate.
        available: u64,
    },

    /// The backing store refused access.
    #[error("permission denied at {path}")]
    PermissionDenied {
        /// Path that was refused.
        path: PathBuf,
    },

    /// The name is already taken; the collision loop picks the next
    /// candidate.
    #[error("destination {name} already exists")]
    AlreadyExists {
        /// The colliding name.
        name: String,
    },

    /// Any other filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The handle was already finalized or aborted.
    #[error("write handle is closed")]
    HandleClosed,
}

impl StorageError {
    /// Wraps an IO error with path context, classifying permission and
    /// collision failures into their dedicated variants.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            },
            _ => Self::Io { path, source },
        }
    }

    /// Maps this error into the closed taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientSpace { .. } => ErrorKind::InsufficientStorage,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::AlreadyExists { .. } | Self::Io { .. } | Self::HandleClosed => {
                ErrorKind::StorageError
            }
        }
    }
}

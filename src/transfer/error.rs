//! Error types for payload transfer.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors crossing the transfer boundary.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The connection could not be established or broke mid-stream.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The payload URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request or the stream timed out.
    #[error("transfer timed out fetching {url}")]
    Timeout {
        /// The payload URL.
        url: String,
    },

    /// The remote end answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The payload URL.
        url: String,
        /// The response status.
        status: StatusCode,
    },

    /// Writing the payload to the destination failed.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Wraps a client error with URL context, peeling timeouts into their
    /// own variant.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Wraps a status rejection with URL context.
    pub fn http_status(url: impl Into<String>, status: StatusCode) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Wraps a destination write failure with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps this error into the closed taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::NetworkError,
            Self::HttpStatus { status, .. } => status_kind(*status),
            Self::Io { source, .. } => {
                if source.kind() == std::io::ErrorKind::PermissionDenied {
                    ErrorKind::PermissionDenied
                } else {
                    ErrorKind::StorageError
                }
            }
        }
    }
}

/// Classifies a non-success status into the closed taxonomy. Server-side
/// failures are retryable network errors; client-side rejections are not.
fn status_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::ItemUnavailable,
        StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => ErrorKind::GeoBlocked,
        s if s.is_server_error() => ErrorKind::NetworkError,
        _ => ErrorKind::UnknownError,
    }
}

//! The closed error taxonomy surfaced by the download state machine.
//!
//! Every failure inside extraction, transfer, or storage is mapped into
//! exactly one [`ErrorKind`] at the boundary where it is caught. Callers
//! never see raw transport- or filesystem-level error types.
//!
//! Cancellation is intentionally *not* an [`ErrorKind`]; it is a distinct
//! terminal signal (see [`crate::orchestrator::TransferEvent::Cancelled`]).

use thiserror::Error;

/// Classification of any fatal download outcome.
///
/// Attached to failed transfer events and returned by the caller-facing
/// metadata operations. The display strings are diagnostic; presentation
/// layers map kinds to their own user-facing copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The input is not a recognized video URL.
    #[error("the URL is not a recognized video link")]
    InvalidUrl,

    /// Connectivity failure, timeout, or server-side transient error.
    #[error("a network error interrupted the operation")]
    NetworkError,

    /// Local filesystem or content-store failure.
    #[error("the file could not be written to storage")]
    StorageError,

    /// Access to the item or the destination was denied.
    #[error("access to the requested resource was denied")]
    PermissionDenied,

    /// The remote item does not exist or has been removed.
    #[error("the requested item is unavailable")]
    ItemUnavailable,

    /// Free space minus the safety buffer cannot hold the payload.
    #[error("not enough free storage space for the download")]
    InsufficientStorage,

    /// The item requires age verification the client cannot provide.
    #[error("the item is age-restricted and cannot be fetched")]
    AgeRestricted,

    /// The item is not served in the current region.
    #[error("the item is not available in this region")]
    GeoBlocked,

    /// Anything that does not fit the other kinds.
    #[error("an unexpected error occurred")]
    UnknownError,
}

impl ErrorKind {
    /// Kinds that are never retried, regardless of the caller's predicate.
    ///
    /// The retry engine enforces this centrally: a predicate marking one of
    /// these as retryable is overruled.
    #[must_use]
    pub fn is_never_retryable(self) -> bool {
        matches!(
            self,
            Self::InvalidUrl | Self::PermissionDenied | Self::AgeRestricted | Self::GeoBlocked
        )
    }

    /// Kinds retried by the default predicate.
    #[must_use]
    pub fn is_retryable_by_default(self) -> bool {
        matches!(self, Self::NetworkError)
    }
}

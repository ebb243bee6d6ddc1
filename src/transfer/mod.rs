//! Payload transfer: streaming bytes from a resolved media URL into an
//! allocated storage destination, reporting progress along the way.

mod error;
mod http;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::TransferError;
pub use http::HttpTransferClient;

use crate::storage::WriteHandle;

/// A progress observation emitted while a payload streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes written so far.
    pub bytes: u64,
    /// Total payload size, when the remote end declared one.
    pub total: Option<u64>,
}

/// Streams a remote payload into a write handle.
///
/// Implementations send [`ProgressUpdate`]s as bytes land; the receiver
/// side may lag or disappear, so sends are fire-and-forget.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Streams the payload at `payload_url` into `destination`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`TransferError`] when the connection, the response, or the write
    /// fails.
    async fn stream(
        &self,
        payload_url: &str,
        destination: &mut WriteHandle,
        progress: &mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<u64, TransferError>;
}

//! HTTP streaming transfer client built on a pooled `reqwest` client.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::{ProgressUpdate, TransferClient, TransferError};
use crate::storage::WriteHandle;

/// Seconds allowed for connection establishment.
const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Seconds allowed for the whole request, covering large payloads.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Streams payloads over HTTP, writing chunks as they arrive.
#[derive(Debug, Clone)]
pub struct HttpTransferClient {
    client: reqwest::Client,
}

impl Default for HttpTransferClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransferClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized; this is a startup
    /// failure with no recovery path.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Creates a client over an existing `reqwest` client, keeping its
    /// pool and timeout configuration.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    #[instrument(skip(self, destination, progress), fields(url = payload_url))]
    async fn stream(
        &self,
        payload_url: &str,
        destination: &mut WriteHandle,
        progress: &mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<u64, TransferError> {
        let response = self
            .client
            .get(payload_url)
            .send()
            .await
            .map_err(|e| TransferError::network(payload_url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "payload request rejected");
            return Err(TransferError::http_status(payload_url, status));
        }

        let total = response.content_length();
        let path = destination.path().to_path_buf();
        let file = destination
            .writer()
            .map_err(|_| TransferError::io(&path, std::io::Error::other("destination closed")))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| TransferError::network(payload_url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::io(&path, e))?;
            written += chunk.len() as u64;
            // Receiver may have gone away; progress is best-effort.
            let _ = progress.send(ProgressUpdate {
                bytes: written,
                total,
            });
        }

        file.flush().await.map_err(|e| TransferError::io(&path, e))?;
        debug!(written, "payload streamed");
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::{DirectBackend, StorageBackend};

    async fn destination(dir: &TempDir) -> (DirectBackend, WriteHandle) {
        let backend = DirectBackend::new(dir.path()).unwrap();
        let handle = backend.create_exclusive("clip.mp4").await.unwrap();
        (backend, handle)
    }

    #[tokio::test]
    async fn test_stream_writes_payload_and_reports_progress() {
        let server = MockServer::start().await;
        let payload = vec![0xAB; 4096];
        Mock::given(method("GET"))
            .and(path("/v/clip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (backend, mut handle) = destination(&dir).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let client = HttpTransferClient::new();
        let url = format!("{}/v/clip", server.uri());
        let written = client.stream(&url, &mut handle, &tx).await.unwrap();
        assert_eq!(written, 4096);

        let final_path = backend.finalize(&mut handle).await.unwrap();
        assert_eq!(std::fs::read(final_path).unwrap(), payload);

        drop(tx);
        let mut last = None;
        while let Some(update) = rx.recv().await {
            if let Some(prev) = last {
                assert!(update.bytes >= prev, "progress went backwards");
            }
            last = Some(update.bytes);
        }
        assert_eq!(last, Some(4096));
    }

    #[tokio::test]
    async fn test_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (_backend, mut handle) = destination(&dir).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let client = HttpTransferClient::new();
        let url = format!("{}/v/missing", server.uri());
        let error = client.stream(&url, &mut handle, &tx).await.unwrap_err();
        assert!(matches!(error, TransferError::HttpStatus { .. }));
        assert_eq!(error.kind(), crate::error::ErrorKind::ItemUnavailable);
    }

    #[tokio::test]
    async fn test_stream_connection_refused_is_network_error() {
        let dir = TempDir::new().unwrap();
        let (_backend, mut handle) = destination(&dir).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let client = HttpTransferClient::new();
        // Port 9 (discard) is almost certainly closed.
        let error = client
            .stream("http://127.0.0.1:9/v/clip", &mut handle, &tx)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::NetworkError);
    }
}

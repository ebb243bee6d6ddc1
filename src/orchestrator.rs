//! The download state machine.
//!
//! One orchestrator instance drives one download run as a single async
//! task: validate connectivity, validate the URL, extract metadata (with
//! retry), allocate a destination, stream the payload, finalize. Callers
//! observe the run through an event stream that carries progress and
//! exactly one terminal event, and through a watchable [`DownloadState`].
//!
//! Cancellation is cooperative and distinct from failure: a cancelled run
//! aborts its allocated handle and terminates with
//! [`TransferEvent::Cancelled`], never with an [`ErrorKind`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::cancel::{self, CancelHandle, CancelSignal};
use crate::config::DownloadConfig;
use crate::error::ErrorKind;
use crate::extract::{ExtractionClient, MediaInfo};
use crate::network::{NetworkMonitor, Suitability};
use crate::parser::{self, InvalidUrlReason, UrlValidation};
use crate::retry::{RetryError, RetryPolicy};
use crate::storage::{StorageService, WriteHandle, build_output_name};
use crate::transfer::{ProgressUpdate, TransferClient};

/// Phase of a download run. `Idle` is initial; `Completed` and `Failed`
/// are terminal (cancellation rests in `Failed` with a
/// [`TransferEvent::Cancelled`] terminal event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// No run started yet.
    Idle,
    /// Checking connectivity suitability.
    ValidatingNetwork,
    /// Checking the URL shape and identifier.
    ValidatingUrl,
    /// Fetching metadata, possibly across retries.
    ExtractingInfo,
    /// Reserving a destination.
    AllocatingStorage,
    /// Streaming the payload.
    Transferring,
    /// Publishing the destination.
    Finalizing,
    /// The payload is at its final path.
    Completed,
    /// The run ended without a published destination.
    Failed,
}

/// Event observed by the caller of [`DownloadOrchestrator::download`].
///
/// A run emits any number of non-terminal events followed by exactly one
/// terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Connectivity is metered; the transfer proceeds, but the caller may
    /// want to warn or defer.
    MeteredNetwork,
    /// Payload progress, 0 to 100, non-decreasing within a run.
    Progress {
        /// Percent transferred.
        percent: u8,
    },
    /// Terminal: the payload is published at `path`.
    Completed {
        /// Resolved final path.
        path: PathBuf,
    },
    /// Terminal: the run failed with a mapped kind.
    Failed {
        /// The mapped failure.
        kind: ErrorKind,
    },
    /// Terminal: the run was cancelled. Not a failure kind.
    Cancelled,
}

impl TransferEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

/// How a run ended, before it is reported as a terminal event.
enum Terminal {
    Completed(PathBuf),
    Failed(ErrorKind),
    Cancelled,
}

/// Outcome of the transfer phase.
enum TransferOutcome {
    Done,
    Failed(ErrorKind),
    Cancelled,
}

/// Drives one download run end to end.
pub struct DownloadOrchestrator {
    extractor: Arc<dyn ExtractionClient>,
    transfer: Arc<dyn TransferClient>,
    storage: Arc<StorageService>,
    network: Arc<NetworkMonitor>,
    retry: RetryPolicy,
    max_filename_len: usize,
    cancel: CancelHandle,
    state: Arc<watch::Sender<DownloadState>>,
    started: AtomicBool,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator over its collaborators, configured by
    /// `config`.
    #[must_use]
    pub fn new(
        extractor: Arc<dyn ExtractionClient>,
        transfer: Arc<dyn TransferClient>,
        storage: Arc<StorageService>,
        network: Arc<NetworkMonitor>,
        config: &DownloadConfig,
    ) -> Self {
        let (cancel, _) = cancel::pair();
        let (state, _) = watch::channel(DownloadState::Idle);
        Self {
            extractor,
            transfer,
            storage,
            network,
            retry: config.retry_policy(),
            max_filename_len: config.max_filename_len,
            cancel,
            state: Arc::new(state),
            started: AtomicBool::new(false),
        }
    }

    /// Current phase of the run.
    #[must_use]
    pub fn state(&self) -> DownloadState {
        *self.state.borrow()
    }

    /// Watches phase transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<DownloadState> {
        self.state.subscribe()
    }

    /// Requests cooperative cancellation of the run. Safe to call at any
    /// time, including before [`download`](Self::download) or more than
    /// once.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Validates a URL for caller-facing diagnostics.
    ///
    /// When the pattern list rejects the shape or host, the extractor's
    /// own validation backstop is consulted: some extraction backends
    /// accept link formats the patterns do not know about. A backstop
    /// acceptance carries no extracted identifier.
    pub async fn validate(&self, url: &str) -> UrlValidation {
        let validation = parser::validate_with_details(url);
        if !validation.is_valid
            && matches!(
                validation.reason,
                Some(InvalidUrlReason::UnrecognizedHost | InvalidUrlReason::NoShapeMatch)
            )
            && self.extractor.is_valid_url(url).await
        {
            debug!(url, "accepted by extractor backstop");
            return UrlValidation {
                is_valid: true,
                reason: None,
                video_id: None,
            };
        }
        validation
    }

    /// Fetches metadata for a URL without starting a transfer, retrying
    /// transient extraction failures.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidUrl`] for an unaccepted URL, or the mapped kind
    /// of the final extraction failure.
    pub async fn get_info(&self, url: &str) -> Result<MediaInfo, ErrorKind> {
        let Some(id) = parser::normalize(url) else {
            return Err(ErrorKind::InvalidUrl);
        };
        // Metadata queries are standalone; they do not observe the run's
        // cancellation.
        let (_keep_alive, signal) = cancel::pair();
        let extractor = Arc::clone(&self.extractor);
        let result = self
            .retry
            .execute(&signal, RetryPolicy::default_predicate, |_| {
                let extractor = Arc::clone(&extractor);
                let id = id.clone();
                async move { extractor.fetch_info(&id).await.map_err(|e| e.kind()) }
            })
            .await;
        match result {
            Ok(info) => Ok(info),
            Err(RetryError::Fatal { kind, .. }) => Err(kind),
            Err(RetryError::Cancelled) => Err(ErrorKind::UnknownError),
        }
    }

    /// Starts the download run and returns its event stream.
    ///
    /// The stream yields any number of [`TransferEvent::MeteredNetwork`]
    /// and [`TransferEvent::Progress`] events followed by exactly one
    /// terminal event. One run per orchestrator instance: a second call
    /// terminates immediately with [`ErrorKind::UnknownError`].
    #[must_use]
    pub fn download(&self, url: &str) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (events, rx) = mpsc::unbounded_channel();

        if self.started.swap(true, Ordering::SeqCst) {
            warn!("download invoked twice on one orchestrator");
            let _ = events.send(TransferEvent::Failed {
                kind: ErrorKind::UnknownError,
            });
            return rx;
        }

        let run = Run {
            extractor: Arc::clone(&self.extractor),
            transfer: Arc::clone(&self.transfer),
            storage: Arc::clone(&self.storage),
            network: Arc::clone(&self.network),
            retry: self.retry.clone(),
            max_filename_len: self.max_filename_len,
            cancel: self.cancel.signal(),
            state: Arc::clone(&self.state),
        };
        let url = url.to_string();
        tokio::spawn(run.run(url, events));
        rx
    }
}

/// Everything the spawned run task owns.
struct Run {
    extractor: Arc<dyn ExtractionClient>,
    transfer: Arc<dyn TransferClient>,
    storage: Arc<StorageService>,
    network: Arc<NetworkMonitor>,
    retry: RetryPolicy,
    max_filename_len: usize,
    cancel: CancelSignal,
    state: Arc<watch::Sender<DownloadState>>,
}

impl Run {
    fn set_state(&self, state: DownloadState) {
        let _ = self.state.send(state);
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn run(mut self, url: String, events: mpsc::UnboundedSender<TransferEvent>) {
        let terminal = self.drive(&url, &events).await;
        let (state, event) = match terminal {
            Terminal::Completed(path) => {
                info!(path = %path.display(), "download completed");
                (DownloadState::Completed, TransferEvent::Completed { path })
            }
            Terminal::Failed(kind) => {
                warn!(%kind, "download failed");
                (DownloadState::Failed, TransferEvent::Failed { kind })
            }
            Terminal::Cancelled => {
                info!("download cancelled");
                (DownloadState::Failed, TransferEvent::Cancelled)
            }
        };
        self.set_state(state);
        // Receiver may already be gone; the run still settles its state.
        let _ = events.send(event);
    }

    async fn drive(
        &mut self,
        url: &str,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> Terminal {
        if url.trim().is_empty() {
            return Terminal::Failed(ErrorKind::InvalidUrl);
        }

        self.set_state(DownloadState::ValidatingNetwork);
        if self.cancel.is_cancelled() {
            return Terminal::Cancelled;
        }
        match self.network.suitability_for_transfer() {
            Suitability::NotAvailable => {
                warn!("no connectivity; refusing to start transfer");
                return Terminal::Failed(ErrorKind::NetworkError);
            }
            Suitability::Limited => {
                warn!("metered connectivity; proceeding with warning");
                let _ = events.send(TransferEvent::MeteredNetwork);
            }
            Suitability::Suitable => {}
        }

        self.set_state(DownloadState::ValidatingUrl);
        let Some(id) = parser::normalize(url) else {
            let details = parser::validate_with_details(url);
            warn!(url, reason = ?details.reason, "URL rejected");
            return Terminal::Failed(ErrorKind::InvalidUrl);
        };

        self.set_state(DownloadState::ExtractingInfo);
        let extractor = Arc::clone(&self.extractor);
        let fetched = self
            .retry
            .execute(&self.cancel, RetryPolicy::default_predicate, |attempt| {
                let extractor = Arc::clone(&extractor);
                let id = id.clone();
                async move {
                    extractor.fetch_info(&id).await.map_err(|e| {
                        warn!(attempt, error = %e, "extraction attempt failed");
                        e.kind()
                    })
                }
            })
            .await;
        let info = match fetched {
            Ok(info) => info,
            Err(RetryError::Cancelled) => return Terminal::Cancelled,
            Err(RetryError::Fatal { kind, attempts }) => {
                warn!(%kind, attempts, "extraction exhausted");
                return Terminal::Failed(kind);
            }
        };
        // An incomplete record must never reach allocation.
        if !info.is_complete() {
            warn!(id = %info.id, "extractor returned incomplete metadata");
            return Terminal::Failed(ErrorKind::UnknownError);
        }

        if self.cancel.is_cancelled() {
            return Terminal::Cancelled;
        }
        self.set_state(DownloadState::AllocatingStorage);
        let name = build_output_name(&info.title, &info.id, info.container, self.max_filename_len);
        let mut handle = match self.storage.allocate(&name, info.size_bytes).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "allocation failed");
                return Terminal::Failed(e.kind());
            }
        };
        debug!(name = handle.name(), "destination allocated");

        self.set_state(DownloadState::Transferring);
        match self.transfer_payload(&info, &mut handle, events).await {
            TransferOutcome::Cancelled => {
                self.rollback(&mut handle).await;
                Terminal::Cancelled
            }
            TransferOutcome::Failed(kind) => {
                self.rollback(&mut handle).await;
                Terminal::Failed(kind)
            }
            TransferOutcome::Done => {
                self.set_state(DownloadState::Finalizing);
                match self.storage.finalize(&mut handle).await {
                    Ok(path) => Terminal::Completed(path),
                    Err(e) => {
                        warn!(error = %e, "finalize failed");
                        self.rollback(&mut handle).await;
                        Terminal::Failed(e.kind())
                    }
                }
            }
        }
    }

    /// Streams the payload while racing progress updates and cancellation.
    async fn transfer_payload(
        &self,
        info: &MediaInfo,
        handle: &mut WriteHandle,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> TransferOutcome {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut last_percent: Option<u8> = None;
        let mut cancel = self.cancel.clone();

        let result = {
            let stream = self.transfer.stream(&info.payload_url, handle, &progress_tx);
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    result = &mut stream => break Some(result),
                    Some(update) = progress_rx.recv() => {
                        emit_progress(update, info, &mut last_percent, events);
                    }
                    () = cancel.cancelled() => break None,
                }
            }
        };

        match result {
            None => TransferOutcome::Cancelled,
            Some(Err(e)) => {
                warn!(error = %e, "transfer failed");
                TransferOutcome::Failed(e.kind())
            }
            Some(Ok(written)) => {
                // Deliver updates that raced with completion.
                while let Ok(update) = progress_rx.try_recv() {
                    emit_progress(update, info, &mut last_percent, events);
                }
                if last_percent != Some(100) {
                    let _ = events.send(TransferEvent::Progress { percent: 100 });
                }
                debug!(written, "payload streamed");
                TransferOutcome::Done
            }
        }
    }

    async fn rollback(&self, handle: &mut WriteHandle) {
        if let Err(e) = self.storage.abort(handle).await {
            warn!(error = %e, "abort failed; staged entry may linger");
        }
    }
}

/// Converts a byte-count update into a monotonic percentage event.
/// Duplicate or regressing percentages are suppressed; updates with no
/// known total are held back until completion forces 100.
fn emit_progress(
    update: ProgressUpdate,
    info: &MediaInfo,
    last_percent: &mut Option<u8>,
    events: &mpsc::UnboundedSender<TransferEvent>,
) {
    let Some(total) = update.total.or(info.size_bytes).filter(|t| *t > 0) else {
        return;
    };
    #[allow(clippy::cast_possible_truncation)]
    let percent = (update.bytes.saturating_mul(100) / total).min(100) as u8;
    if last_percent.is_none_or(|prev| percent > prev) {
        *last_percent = Some(percent);
        let _ = events.send(TransferEvent::Progress { percent });
    }
}

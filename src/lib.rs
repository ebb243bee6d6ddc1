//! Vidfetch Core Library
//!
//! This library fetches a remote video item identified by a URL: it
//! validates and normalizes the URL, asks an extraction backend for item
//! metadata, and then streams the payload to durable local storage with
//! progress reporting, retry, and cooperative cancellation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`parser`] - URL shape validation and video identifier extraction
//! - [`retry`] - Bounded retry with linear backoff and cancellation
//! - [`network`] - Connectivity state and transfer suitability monitoring
//! - [`storage`] - Destination allocation, staging, and finalization
//! - [`extract`] - Metadata extraction client seam
//! - [`transfer`] - Payload streaming client seam and HTTP implementation
//! - [`orchestrator`] - The download state machine tying it all together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod network;
pub mod orchestrator;
pub mod parser;
pub mod retry;
pub mod storage;
pub mod transfer;

// Re-export commonly used types
pub use cancel::{CancelHandle, CancelSignal};
pub use config::DownloadConfig;
pub use error::ErrorKind;
pub use extract::{ContainerFormat, ExtractError, ExtractionClient, MediaInfo};
pub use network::{
    ChannelSource, ConnectivitySource, NetworkMonitor, NetworkState, Suitability, Transport,
};
pub use orchestrator::{DownloadOrchestrator, DownloadState, TransferEvent};
pub use parser::{
    InvalidUrlReason, UrlValidation, VideoId, is_valid, normalize, validate_with_details,
};
pub use retry::{RetryError, RetryPolicy};
pub use storage::{StorageBackend, StorageError, StorageMode, StorageService, WriteHandle};
pub use transfer::{HttpTransferClient, ProgressUpdate, TransferClient, TransferError};

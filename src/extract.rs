//! Metadata extraction seam.
//!
//! The actual byte-level extraction of a downloadable payload from a media
//! host lives behind [`ExtractionClient`]; this module owns the data model
//! ([`MediaInfo`], [`ContainerFormat`]) and the boundary error type that
//! maps extractor failures into the closed [`ErrorKind`] taxonomy.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::parser::VideoId;

/// Container format of the payload, driving the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    /// MPEG-4 container.
    #[default]
    Mp4,
    /// WebM container.
    Webm,
    /// Matroska container.
    Mkv,
}

impl ContainerFormat {
    /// File extension including the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => ".mp4",
            Self::Webm => ".webm",
            Self::Mkv => ".mkv",
        }
    }
}

/// Metadata for one remote item, produced by an [`ExtractionClient`] and
/// consumed read-only by the orchestrator and storage placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    /// Canonical identifier of the item.
    pub id: VideoId,
    /// Item title; must be non-blank for the record to be usable.
    pub title: String,
    /// URI of the downloadable payload; must be non-blank.
    pub payload_url: String,
    /// Optional thumbnail URI.
    pub thumbnail_url: Option<String>,
    /// Duration in seconds.
    pub duration_secs: u64,
    /// Payload size when the extractor knows it.
    pub size_bytes: Option<u64>,
    /// Container format of the payload.
    pub container: ContainerFormat,
}

impl MediaInfo {
    /// Completeness invariant: identifier, title, and payload locator are
    /// all non-blank. An incomplete record must never reach storage
    /// allocation.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.id.as_str().trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.payload_url.trim().is_empty()
    }
}

/// Failures crossing the extraction boundary.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Connectivity failure while talking to the media host.
    #[error("network error while fetching info for {id}")]
    Network {
        /// Identifier being extracted.
        id: String,
    },

    /// The extraction call exceeded its time ceiling.
    #[error("timed out fetching info for {id}")]
    Timeout {
        /// Identifier being extracted.
        id: String,
    },

    /// The item does not exist or has been removed.
    #[error("item {id} is unavailable")]
    Unavailable {
        /// Identifier being extracted.
        id: String,
    },

    /// The item requires age verification.
    #[error("item {id} is age-restricted")]
    AgeRestricted {
        /// Identifier being extracted.
        id: String,
    },

    /// The item is not served in the current region.
    #[error("item {id} is not available in this region")]
    GeoBlocked {
        /// Identifier being extracted.
        id: String,
    },

    /// Any other extractor failure.
    #[error("extraction failed for {id}: {message}")]
    Unknown {
        /// Identifier being extracted.
        id: String,
        /// Extractor-supplied detail.
        message: String,
    },
}

impl ExtractError {
    /// Creates a network error.
    pub fn network(id: impl Into<String>) -> Self {
        Self::Network { id: id.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(id: impl Into<String>) -> Self {
        Self::Timeout { id: id.into() }
    }

    /// Creates an unavailable-item error.
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self::Unavailable { id: id.into() }
    }

    /// Creates an age-restriction error.
    pub fn age_restricted(id: impl Into<String>) -> Self {
        Self::AgeRestricted { id: id.into() }
    }

    /// Creates a geo-block error.
    pub fn geo_blocked(id: impl Into<String>) -> Self {
        Self::GeoBlocked { id: id.into() }
    }

    /// Creates a catch-all error.
    pub fn unknown(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unknown {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Maps this error into the closed taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::NetworkError,
            Self::Unavailable { .. } => ErrorKind::ItemUnavailable,
            Self::AgeRestricted { .. } => ErrorKind::AgeRestricted,
            Self::GeoBlocked { .. } => ErrorKind::GeoBlocked,
            Self::Unknown { .. } => ErrorKind::UnknownError,
        }
    }
}

/// External collaborator resolving a validated identifier to metadata.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Fetches metadata for `id`.
    ///
    /// # Errors
    ///
    /// Any [`ExtractError`]; the orchestrator retries the kinds its
    /// predicate marks recoverable.
    async fn fetch_info(&self, id: &VideoId) -> Result<MediaInfo, ExtractError>;

    /// Secondary validation backstop, consulted when pattern matching
    /// fails: some extractors accept URL shapes the pattern list does not
    /// know about.
    async fn is_valid_url(&self, url: &str) -> bool {
        let _ = url;
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info(title: &str, payload: &str) -> MediaInfo {
        MediaInfo {
            id: VideoId::parse("dQw4w9WgXcQ").unwrap(),
            title: title.to_string(),
            payload_url: payload.to_string(),
            thumbnail_url: None,
            duration_secs: 212,
            size_bytes: Some(10_000_000),
            container: ContainerFormat::default(),
        }
    }

    #[test]
    fn test_container_default_is_mp4() {
        assert_eq!(ContainerFormat::default(), ContainerFormat::Mp4);
        assert_eq!(ContainerFormat::Mp4.extension(), ".mp4");
        assert_eq!(ContainerFormat::Webm.extension(), ".webm");
        assert_eq!(ContainerFormat::Mkv.extension(), ".mkv");
    }

    #[test]
    fn test_complete_info() {
        assert!(info("A title", "https://cdn.example/payload").is_complete());
    }

    #[test]
    fn test_blank_title_is_incomplete() {
        assert!(!info("", "https://cdn.example/payload").is_complete());
        assert!(!info("   ", "https://cdn.example/payload").is_complete());
    }

    #[test]
    fn test_blank_payload_is_incomplete() {
        assert!(!info("A title", "").is_complete());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(ExtractError::network("x").kind(), ErrorKind::NetworkError);
        assert_eq!(ExtractError::timeout("x").kind(), ErrorKind::NetworkError);
        assert_eq!(
            ExtractError::unavailable("x").kind(),
            ErrorKind::ItemUnavailable
        );
        assert_eq!(
            ExtractError::age_restricted("x").kind(),
            ErrorKind::AgeRestricted
        );
        assert_eq!(ExtractError::geo_blocked("x").kind(), ErrorKind::GeoBlocked);
        assert_eq!(
            ExtractError::unknown("x", "boom").kind(),
            ErrorKind::UnknownError
        );
    }

    #[test]
    fn test_error_display_carries_identifier() {
        let err = ExtractError::unavailable("dQw4w9WgXcQ");
        assert!(err.to_string().contains("dQw4w9WgXcQ"));
    }
}

//! Accepted video URL shapes and identifier extraction.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

/// Canonical length of a video identifier.
pub const VIDEO_ID_LEN: usize = 11;

/// Hosts accepted by the validator, matched case-insensitively.
const ACCEPTED_HOSTS: [&str; 4] = ["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

/// Ordered accepted URL shapes; the first matching pattern governs
/// identifier extraction. Each pattern captures the candidate identifier
/// loosely so that a too-short or too-long token still *matches* the shape
/// and is then rejected by [`VideoId::parse`].
#[allow(clippy::expect_used)]
static URL_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Canonical watch page, v= anywhere in the query
        r"(?i)^https?://(?:www\.)?youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]+)(?:[&#].*)?$",
        // Short link
        r"(?i)^https?://youtu\.be/([A-Za-z0-9_-]+)(?:[?#].*)?$",
        // Shorts
        r"(?i)^https?://(?:www\.|m\.)?youtube\.com/shorts/([A-Za-z0-9_-]+)(?:[?#].*)?$",
        // Embed
        r"(?i)^https?://(?:www\.)?youtube\.com/embed/([A-Za-z0-9_-]+)(?:[?#].*)?$",
        // Live
        r"(?i)^https?://(?:www\.|m\.)?youtube\.com/live/([A-Za-z0-9_-]+)(?:[?#].*)?$",
        // Mobile-subdomain watch page
        r"(?i)^https?://m\.youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]+)(?:[&#].*)?$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("URL shape regex is valid")) // Static patterns
    .collect()
});

/// A canonical video identifier: exactly [`VIDEO_ID_LEN`] characters of
/// `[A-Za-z0-9_-]`. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    /// Parses a candidate token, enforcing length and character class.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let valid = token.len() == VIDEO_ID_LEN
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        valid.then(|| Self(token.to_string()))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a URL failed validation. Reasons are reported in a fixed order:
/// blank, missing scheme, unrecognized host, no shape match, identifier
/// extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUrlReason {
    /// Blank or whitespace-only input.
    #[error("URL is empty or null")]
    Empty,

    /// No explicit `http://` or `https://` prefix.
    #[error("URL must start with http:// or https://")]
    MissingScheme,

    /// Host is not one of the accepted video hosts.
    #[error("host is not a recognized video site")]
    UnrecognizedHost,

    /// Accepted host, but no accepted URL shape matched.
    #[error("URL does not match any accepted video link format")]
    NoShapeMatch,

    /// A shape matched but the captured token is not a well-formed
    /// identifier.
    #[error("could not extract a valid video identifier")]
    IdExtraction,
}

/// Detailed validation outcome for caller-facing diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlValidation {
    /// Whether the URL is accepted.
    pub is_valid: bool,
    /// First failing reason when invalid.
    pub reason: Option<InvalidUrlReason>,
    /// Extracted identifier when valid.
    pub video_id: Option<VideoId>,
}

impl UrlValidation {
    fn valid(id: VideoId) -> Self {
        Self {
            is_valid: true,
            reason: None,
            video_id: Some(id),
        }
    }

    fn invalid(reason: InvalidUrlReason) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
            video_id: None,
        }
    }
}

/// Returns true iff the URL matches an accepted shape and carries a
/// well-formed identifier.
#[must_use]
pub fn is_valid(url: &str) -> bool {
    normalize(url).is_some()
}

/// Extracts the canonical identifier from an accepted URL.
///
/// The first matching shape governs extraction. A shape match whose
/// captured token fails the identifier invariant yields `None`.
#[must_use]
pub fn normalize(url: &str) -> Option<VideoId> {
    let url = url.trim();
    // Fast path: blank input never reaches pattern evaluation.
    if url.is_empty() {
        return None;
    }
    let token = first_shape_capture(url)?;
    VideoId::parse(token)
}

/// Validates a URL and reports the first failing reason in deterministic
/// order, for debuggable messages.
#[must_use]
pub fn validate_with_details(url: &str) -> UrlValidation {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return UrlValidation::invalid(InvalidUrlReason::Empty);
    }

    if !has_http_scheme(trimmed) {
        return UrlValidation::invalid(InvalidUrlReason::MissingScheme);
    }

    if !has_accepted_host(trimmed) {
        return UrlValidation::invalid(InvalidUrlReason::UnrecognizedHost);
    }

    let Some(token) = first_shape_capture(trimmed) else {
        return UrlValidation::invalid(InvalidUrlReason::NoShapeMatch);
    };

    match VideoId::parse(token) {
        Some(id) => {
            trace!(url = %trimmed, id = %id, "URL validated");
            UrlValidation::valid(id)
        }
        // Shape matched but the captured token is malformed.
        None => UrlValidation::invalid(InvalidUrlReason::IdExtraction),
    }
}

/// Captured identifier token of the first matching shape, if any.
fn first_shape_capture(url: &str) -> Option<&str> {
    URL_SHAPES
        .iter()
        .find_map(|shape| shape.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn has_accepted_host(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    parsed
        .host_str()
        .is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            ACCEPTED_HOSTS.contains(&host.as_str())
        })
}

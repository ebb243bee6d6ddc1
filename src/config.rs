//! Download configuration surface with serde-backed defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Default maximum retry attempts (including the initial attempt).
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default base retry delay (1 second).
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1000;

/// Default minimum free-space safety buffer (100 MiB).
pub const DEFAULT_SAFETY_BUFFER_BYTES: u64 = 100 * 1024 * 1024;

/// Default maximum output filename length.
pub const DEFAULT_MAX_FILENAME_LEN: usize = 100;

/// Configuration consumed by the orchestrator and its collaborators.
///
/// Deserializes from partial config values: any omitted field takes its
/// documented default, so an empty `{}` yields the default configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Maximum extraction attempts, including the first (minimum 1).
    pub max_retry_attempts: u32,

    /// Base unit for linear retry backoff, in milliseconds.
    pub base_retry_delay_ms: u64,

    /// Free space that must remain untouched after an allocation.
    pub safety_buffer_bytes: u64,

    /// Maximum length of a generated output filename, in characters.
    pub max_filename_len: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_retry_delay_ms: DEFAULT_BASE_RETRY_DELAY_MS,
            safety_buffer_bytes: DEFAULT_SAFETY_BUFFER_BYTES,
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }
}

impl DownloadConfig {
    /// The base retry delay as a [`Duration`].
    #[must_use]
    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    /// Builds the retry policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry_attempts, self.base_retry_delay())
    }
}

//! Sync error taxonomy
//!
//! Failures are tagged terminal vs retryable at the upstream-client
//! boundary so the retry policy can stop early instead of waiting out
//! the full backoff schedule on an error that cannot succeed.

use thiserror::Error;

/// Classifies an error for the retry policy.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

/// Failure fetching one extension's metrics from the marketplace.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The catalog response did not contain the extension. Terminal.
    #[error("extension not found in marketplace response")]
    NotFound,

    /// Network failure, non-2xx status, or malformed response body.
    #[error("marketplace request failed: {0}")]
    Transient(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Top-level sync failure that aborts an entire run.
///
/// Per-item failures never surface here; they are recorded as strings
/// in the run's error list and the loop continues.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The universe of tracked extensions could not be loaded. No
    /// per-item work runs; the run is recorded as `failed` with this
    /// as its sole error.
    #[error("failed to load tracked extensions: {0}")]
    UniverseFetch(String),
}

//! Error types for the wishlist cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the wishlist cache
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Source Fetch Errors
    // =========================================================================
    /// Live fetch exceeded its time budget
    #[error("Fetch from {source_name} timed out after {timeout:?}")]
    FetchTimeout {
        source_name: String,
        timeout: Duration,
    },

    /// Live fetch failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// GitHub connection error
    #[error("GitHub connection error: {0}")]
    GithubConnection(#[source] reqwest::Error),

    /// GitHub returned an unexpected response
    #[error("Unexpected GitHub response: {0}")]
    GithubResponse(String),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("Snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Record rejected at the updater boundary
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry later (the source was temporarily unavailable).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FetchTimeout { .. }
                | Error::Fetch(_)
                | Error::GithubConnection(_)
                | Error::GithubResponse(_)
        )
    }
}

/// Cloneable form of a live-fetch failure.
///
/// A single in-flight fetch may be awaited by many readers, so its outcome
/// has to be `Clone`; it is turned back into [`Error`] for each caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Timed out waiting for the named source
    Timeout { source_name: String, timeout: Duration },
    /// Source reported an error
    Source(String),
}

impl FetchFailure {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::Timeout { .. } => "timeout",
            FetchFailure::Source(_) => "source",
        }
    }
}

impl From<FetchFailure> for Error {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Timeout {
                source_name,
                timeout,
            } => Error::FetchTimeout {
                source_name,
                timeout,
            },
            FetchFailure::Source(msg) => Error::Fetch(msg),
        }
    }
}

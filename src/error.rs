//! Error types for fetch-core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped so callers can tell apart the four ways a transfer fails:
//!
//! ### Configuration
//! The request can never succeed as written: unparsable URL, unsupported
//! source kind, no usable quality on a video page, bad header values.
//!
//! ### Transport
//! We could not talk to the server properly: non-2xx responses, connection
//! failures, generic cancellation.
//!
//! ### Content
//! We reached the server but got the wrong thing: a gating page without a
//! confirmation link, a player page without a source, an undersized body, a
//! malformed playlist.
//!
//! ### Slow transfer
//! The speed watchdog gave up on the transfer. Kept separate from a generic
//! cancellation so callers can retry with different parameters.

use thiserror::Error;

/// Result type alias using our FetchError type
pub type Result<T> = std::result::Result<T, FetchError>;

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Content,
    SlowTransfer,
    Local,
}

/// Main error type for fetch-core
#[derive(Error, Debug)]
pub enum FetchError {
    // ===== Configuration Errors =====

    /// Source value could not be parsed as a URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Descriptor kind has no strategy
    #[error("Unsupported source kind: {0}")]
    UnsupportedKind(String),

    /// Video page offered none of the known quality labels
    #[error("No usable quality offered by {0}")]
    NoUsableQuality(String),

    /// Header name or value rejected by the HTTP stack
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== Transport Errors =====

    /// Server answered with a status we cannot use
    #[error("Server responded with unexpected status code: {status_code} ({url})")]
    UnexpectedStatus { status_code: u16, url: String },

    /// Transfer was cancelled by something other than the speed watchdog
    #[error("Operation cancelled")]
    Cancelled,

    // ===== Content Errors =====

    /// Gating page parsed but no confirmation link was found
    #[error("Cannot resolve direct link from {0}")]
    MissingDirectLink(String),

    /// Hosting service reported an error on its page; the text is kept verbatim
    #[error("{0}")]
    HostError(String),

    /// Player page has no video source
    #[error("No video source found on {0}")]
    MissingSource(String),

    /// Body is smaller than the minimum accepted media size
    #[error("File size {actual} bytes is below the {minimum} byte minimum")]
    Undersized { actual: u64, minimum: u64 },

    /// Transfer ended before the declared size was written
    #[error("Transfer incomplete: {written}/{expected} bytes")]
    IncompleteTransfer { written: u64, expected: u64 },

    /// Playlist could not be parsed or contains nothing to download
    #[error("Invalid playlist: {0}")]
    InvalidPlaylist(String),

    /// Encrypted segment could not be decrypted
    #[error("Decryption failed: {0}")]
    Decryption(String),

    // ===== Watchdog =====

    /// Speed watchdog cancelled the transfer
    #[error("Cancelled: slow transfer (below {threshold} bytes/s for {samples} samples)")]
    SlowTransfer { threshold: u64, samples: u32 },

    // ===== Context =====

    /// Wraps an error with the stage that produced it
    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<FetchError>,
    },

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::InternalError(format!("Task failed: {}", err))
    }
}

// Helper methods for creating common errors
impl FetchError {
    /// Create an InvalidUrl error
    pub fn invalid_url<U: Into<String>, R: ToString>(url: U, reason: R) -> Self {
        FetchError::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an UnexpectedStatus error from a response status
    pub fn status(status: reqwest::StatusCode, url: &str) -> Self {
        FetchError::UnexpectedStatus {
            status_code: status.as_u16(),
            url: url.to_string(),
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        FetchError::InternalError(message.into())
    }

    /// Attach the stage that failed
    pub fn in_stage(self, stage: &'static str) -> Self {
        FetchError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping stage wrappers
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            FetchError::InvalidUrl { .. }
            | FetchError::UnsupportedKind(_)
            | FetchError::NoUsableQuality(_)
            | FetchError::InvalidHeader { .. }
            | FetchError::InvalidConfiguration(_)
            | FetchError::UrlParseError(_) => ErrorCategory::Configuration,

            FetchError::UnexpectedStatus { .. }
            | FetchError::Cancelled
            | FetchError::ReqwestError(_) => ErrorCategory::Transport,

            FetchError::MissingDirectLink(_)
            | FetchError::HostError(_)
            | FetchError::MissingSource(_)
            | FetchError::Undersized { .. }
            | FetchError::IncompleteTransfer { .. }
            | FetchError::InvalidPlaylist(_)
            | FetchError::Decryption(_) => ErrorCategory::Content,

            FetchError::SlowTransfer { .. } => ErrorCategory::SlowTransfer,

            FetchError::IoError(_)
            | FetchError::SerdeJsonError(_)
            | FetchError::InternalError(_)
            | FetchError::Stage { .. } => ErrorCategory::Local,
        }
    }

    /// Check if the error comes from a cancelled transfer (watchdog or not)
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.root(),
            FetchError::Cancelled | FetchError::SlowTransfer { .. }
        )
    }

    /// Check if the watchdog gave up on the transfer
    pub fn is_slow_transfer(&self) -> bool {
        matches!(self.root(), FetchError::SlowTransfer { .. })
    }

    /// Check if the server was reached but returned the wrong thing
    pub fn is_content_error(&self) -> bool {
        self.category() == ErrorCategory::Content
    }

    /// Check if error is worth retrying by the caller
    ///
    /// Nothing is retried inside the crate; this only advises callers.
    /// Returns `true` for:
    /// - Slow transfers (retry with other parameters)
    /// - 5xx and 429 responses
    /// - Connection and timeout errors from the HTTP client
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            FetchError::SlowTransfer { .. } => true,
            FetchError::UnexpectedStatus { status_code, .. } => {
                *status_code == 429 || (500..=599).contains(status_code)
            }
            FetchError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Host messages are passed through untouched, even when localized.
    pub fn user_message(&self) -> String {
        match self.root() {
            FetchError::SlowTransfer { .. } => {
                "Download cancelled because the transfer was too slow. Try again later or with fewer parts.".to_string()
            }
            FetchError::NoUsableQuality(_) => {
                "The video page does not offer any supported quality.".to_string()
            }
            FetchError::Undersized { actual, minimum } => format!(
                "Downloaded file is too small ({:.1} MB, need at least {:.1} MB); the host probably returned an error page.",
                *actual as f64 / 1_000_000.0,
                *minimum as f64 / 1_000_000.0
            ),
            FetchError::UnsupportedKind(kind) => {
                format!("Source kind '{}' is not supported.", kind)
            }
            FetchError::HostError(message) => message.clone(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_keeps_category() {
        let err = FetchError::MissingDirectLink("page".into()).in_stage("drive export page");
        assert_eq!(err.category(), ErrorCategory::Content);
        assert!(err.to_string().starts_with("drive export page: "));
    }

    #[test]
    fn test_slow_transfer_is_distinct_from_cancel() {
        let slow = FetchError::SlowTransfer { threshold: 100_000, samples: 30 };
        assert!(slow.is_slow_transfer());
        assert!(slow.is_cancelled());
        assert!(slow.is_retryable());

        assert!(!FetchError::Cancelled.is_slow_transfer());
        assert_eq!(FetchError::Cancelled.category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_host_error_is_verbatim() {
        let err = FetchError::HostError("Không thể tải tệp".into());
        assert_eq!(err.to_string(), "Không thể tải tệp");
        assert_eq!(err.user_message(), "Không thể tải tệp");
    }

    #[test]
    fn test_retryable_status() {
        let server = FetchError::UnexpectedStatus { status_code: 503, url: "u".into() };
        let missing = FetchError::UnexpectedStatus { status_code: 404, url: "u".into() };
        assert!(server.is_retryable());
        assert!(!missing.is_retryable());
    }
}

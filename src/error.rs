//! Error types for Multiget
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by where they surface in a transfer (input, probe,
//! worker, record, file) so the engine can decide what is fatal and what the
//! supervisor may retry.
//!
//! ## Propagation
//!
//! - Worker-level errors (`NetworkError`, `IncompleteBody`, `RangeNotSupported`,
//!   reqwest I/O) are absorbed by the supervisor and retried from the last
//!   committed offset. They never reach the caller directly.
//! - Engine-level errors (`ProbeFailed`, `UnknownFileSize`, `NoFunctionalWorker`,
//!   `RemoteChanged`, I/O while finalizing) are fatal: they are reported through
//!   the listener and returned from the blocking call that detected them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our DownloadError type
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Main error type for Multiget
#[derive(Error, Debug)]
pub enum DownloadError {
    // ===== Input Errors =====

    /// Download URL could not be parsed or uses an unsupported scheme
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== Initialization Errors =====

    /// Metadata probe did not return 200 OK
    #[error("Server responded with unexpected status code {status_code} for {host}")]
    ProbeFailed {
        status_code: u16,
        host: String,
    },

    /// Server did not report a usable Content-Length
    #[error("Unknown file size")]
    UnknownFileSize,

    /// Operation needs a probed transfer
    #[error("Transfer is not initialized")]
    NotInitialized,

    // ===== Download Errors =====

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server answered a ranged request for a non-zero start with the whole entity
    #[error("Server ignored range request starting at byte {start}")]
    RangeNotSupported {
        start: u64,
    },

    /// Response body ended before the worker's range was complete
    #[error("Response body ended early: expected {expected} bytes, got {actual} bytes")]
    IncompleteBody {
        expected: u64,
        actual: u64,
    },

    /// Remote Last-Modified tag no longer matches the one recorded at initialization
    #[error("Remote file changed since the transfer started (expected {expected:?}, got {actual:?})")]
    RemoteChanged {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Every worker is down and the restart budget is spent
    #[error("No download worker functional after {restarts} restarts")]
    NoFunctionalWorker {
        restarts: u32,
    },

    // ===== Record/File Errors =====

    /// Progress record missing or unreadable, so there is nothing to resume
    #[error("Progress record unavailable: {0}")]
    RecordUnavailable(PathBuf),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== General Errors =====

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl DownloadError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        DownloadError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        DownloadError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        DownloadError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is retryable by restarting a worker from its last offset
    ///
    /// Returns `true` for transient errors that might succeed on retry:
    /// - Network errors marked as transient
    /// - Timeouts, connection resets and body read failures from reqwest
    /// - Truncated bodies and raw I/O errors while streaming
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::NetworkError { is_transient, .. } => *is_transient,
            DownloadError::IncompleteBody { .. } => true,
            DownloadError::ReqwestError(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
            }
            DownloadError::IoError(_) => true,
            _ => false,
        }
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            DownloadError::FileIoError(_)
                | DownloadError::RecordUnavailable(_)
                | DownloadError::IoError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::UnknownFileSize => {
                "The server did not report the file size, so the file cannot be split for download.".to_string()
            }
            DownloadError::ProbeFailed { status_code, host } => {
                format!("{} refused the download (HTTP {}).", host, status_code)
            }
            DownloadError::RemoteChanged { .. } => {
                "The file changed on the server. Start the download again to fetch the new version.".to_string()
            }
            DownloadError::NoFunctionalWorker { .. } => {
                "The connection kept failing. Check your network and resume the download.".to_string()
            }
            DownloadError::RecordUnavailable(path) => {
                format!("No resumable download found at {}.", path.display())
            }
            _ => self.to_string(),
        }
    }
}

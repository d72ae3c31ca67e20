//! Error types for the download module.
//!
//! Every failure of a transfer attempt is reported as a [`WorkerError`]:
//! the worker retains it as its last error, hands it to the notifier and
//! returns it from [`Worker::run`](super::Worker::run). Sources are held in
//! `Arc` so all three can share one value.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::metadata::MetadataError;

/// Errors that end a transfer attempt.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// `run()` or `reset()` was called while a previous attempt is still in
    /// flight, or `set_verification()` outside the `Idle` state.
    #[error("worker busy")]
    Busy,

    /// The finished file does not match the caller's expected checksum.
    ///
    /// The destination and its metadata are left on disk.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Destination path.
        path: PathBuf,
        /// Expected digest (hex).
        expected: String,
        /// Digest of the file on disk (hex).
        actual: String,
    },

    /// The server answered with a status the resume protocol does not handle.
    #[error("HTTP {status} from {url}{}", format_body(.body))]
    Remote {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Leading bytes of the response body (lossy UTF-8, bounded).
        body: String,
    },

    /// Network-level failure (DNS, connect, TLS, timeout, broken body stream).
    #[error("network error downloading {url}: {source}")]
    Transport {
        /// Requested URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// The caller's cancellation token fired while the transfer was running.
    #[error("transfer of {url} cancelled")]
    Cancelled {
        /// Requested URL.
        url: String,
    },

    /// Local file system failure on the destination.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The URL cannot be requested.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The side-car metadata could not be read or written.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl WorkerError {
    /// Creates a transport error from a reqwest error.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a remote status error.
    pub fn remote(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a checksum mismatch error from raw digests.
    pub fn checksum_mismatch(path: impl Into<PathBuf>, expected: &[u8], actual: &[u8]) -> Self {
        Self::ChecksumMismatch {
            path: path.into(),
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Whether calling `run()` again may succeed without outside intervention.
    ///
    /// Network failures, cancellations and remote statuses are retryable;
    /// partial state is preserved for them. Local faults and checksum
    /// failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Cancelled { .. } | Self::Remote { .. }
        )
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" -> {body}")
    }
}

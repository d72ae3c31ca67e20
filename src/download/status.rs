//! Transfer status vocabulary and the notifier contract.

use std::fmt;

use super::WorkerError;

/// Visible state of a [`Worker`](super::Worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Bound to a URL and destination, nothing started.
    #[default]
    Idle,
    /// Request or local verification in flight.
    Work,
    /// Response body streaming to disk.
    Download,
    /// Destination was already complete and verified; no body was fetched.
    Exists,
    /// Transfer finished.
    Completed,
    /// Attempt failed; see [`Worker::error`](super::Worker::error).
    Error,
}

impl Status {
    /// Stable label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Work => "Work",
            Self::Download => "Download",
            Self::Exists => "Exists",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }

    /// Whether no attempt is running, so the worker may be started or rebound.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Exists | Self::Completed | Self::Error
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every status transition and every write of a transfer.
///
/// Called synchronously on the task running the transfer, after the digest
/// and offset state it describes has been updated (and persisted, when a
/// checkpoint was due). Implementations sit on the hot write path and must
/// return quickly.
pub trait Notifier: Send + Sync {
    /// Reports `status`.
    ///
    /// `error` is set only for [`Status::Error`]. `offset` is the number of
    /// destination bytes accounted for so far; `size` is the total expected
    /// size when the server announced one.
    fn notify(&self, status: Status, error: Option<&WorkerError>, offset: u64, size: Option<u64>);
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _: Status, _: Option<&WorkerError>, _: u64, _: Option<u64>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_idle() {
        assert_eq!(Status::default(), Status::Idle);
    }

    #[test]
    fn test_status_display_labels() {
        assert_eq!(Status::Download.to_string(), "Download");
        assert_eq!(Status::Exists.to_string(), "Exists");
    }

    #[test]
    fn test_status_settled_states() {
        for status in [Status::Idle, Status::Exists, Status::Completed, Status::Error] {
            assert!(status.is_settled(), "{status} should be settled");
        }
        for status in [Status::Work, Status::Download] {
            assert!(!status.is_settled(), "{status} should be in flight");
        }
    }
}

//! Constants for the download module (timeouts, buffer and persistence sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of bytes written between two metadata checkpoints (5 MiB).
pub const DEFAULT_SYNC_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Buffer size for re-reading an existing destination during verification (64 KiB).
pub const VERIFY_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum number of response body bytes kept in a remote error.
pub const REMOTE_ERROR_BODY_LIMIT: usize = 1024;

//! Error types for the metadata store.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while loading, saving or removing a side-car record.
///
/// Sources are reference-counted so the error can be cloned into the
/// worker's retained `last error` slot.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The side-car file could not be read, written, renamed or removed.
    #[error("IO error on metadata file {path}: {source}")]
    Io {
        /// Side-car path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The record could not be serialized.
    #[error("failed to encode metadata for {path} as {codec}: {message}")]
    Encode {
        /// Side-car path.
        path: PathBuf,
        /// Codec name.
        codec: &'static str,
        /// Serializer message.
        message: String,
    },

    /// An existing side-car file is malformed.
    #[error("malformed metadata file {path} ({codec}): {message}")]
    Decode {
        /// Side-car path.
        path: PathBuf,
        /// Codec name.
        codec: &'static str,
        /// Deserializer message.
        message: String,
    },
}

impl MetadataError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = MetadataError::io("/tmp/.file.bin.resume", io_error);
        let msg = error.to_string();
        assert!(
            msg.contains("/tmp/.file.bin.resume"),
            "Expected path in: {msg}"
        );
        assert!(msg.contains("access denied"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_metadata_error_decode_display_names_codec() {
        let error = MetadataError::Decode {
            path: PathBuf::from("/tmp/.a.resume"),
            codec: "json",
            message: "expected value".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("json"), "Expected codec in: {msg}");
        assert!(msg.contains("malformed"), "Expected 'malformed' in: {msg}");
    }
}

//! Persistent side-car record of a transfer's resume state.
//!
//! One record lives next to each in-flight destination, under a hidden
//! name derived from the destination's file name (see [`metadata_path`]).
//! The record and the destination file are two halves of one transaction:
//! `resume_digest` is the resume-algorithm digest of exactly the first
//! `resume_offset` bytes of the destination as it stood when the record was
//! last saved.
//!
//! # Lifecycle
//!
//! - created empty when a fresh transfer starts and saved before the first
//!   byte is written
//! - re-saved periodically while bytes stream in
//! - removed when the transfer completes, or when stale state forces a
//!   restart from byte zero
//! - left on disk after a final checksum mismatch so the failure can be
//!   inspected and retried

mod codec;
mod error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use codec::{BinaryCodec, CodecError, JsonCodec, MetadataCodec};
pub use error::MetadataError;

/// Prefix that hides the side-car file on Unix-like systems.
const HIDDEN_PREFIX: &str = ".";

/// Suffix distinguishing the side-car from the destination.
const SIDECAR_SUFFIX: &str = ".resume";

/// Resume state of a single transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Caller-supplied digest of the complete file; empty when none was given.
    #[serde(with = "checksum_bytes")]
    pub expected_full_checksum: Vec<u8>,
    /// Opaque server revalidation token (`Last-Modified` or a strong `ETag`).
    pub validator: String,
    /// Bytes of the destination covered by `resume_digest`.
    pub resume_offset: u64,
    /// Resume-algorithm digest of the first `resume_offset` bytes.
    #[serde(with = "checksum_bytes")]
    pub resume_digest: Vec<u8>,
}

impl Metadata {
    /// Clears every field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the record holds a verifiable prefix.
    #[must_use]
    pub fn has_resume_point(&self) -> bool {
        self.resume_offset > 0 && !self.resume_digest.is_empty()
    }
}

/// Derives the side-car path for `destination`.
///
/// `downloads/image.iso` maps to `downloads/.image.iso.resume`.
#[must_use]
pub fn metadata_path(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = format!("{HIDDEN_PREFIX}{file_name}{SIDECAR_SUFFIX}");
    match destination.parent() {
        Some(parent) => parent.join(sidecar),
        None => PathBuf::from(sidecar),
    }
}

/// A [`Metadata`] record bound to its side-car file and codec.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    codec: Arc<dyn MetadataCodec>,
    record: Metadata,
}

impl MetadataStore {
    /// Creates a store holding an empty record without touching disk.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>, codec: Arc<dyn MetadataCodec>) -> Self {
        Self {
            path: path.into(),
            codec,
            record: Metadata::default(),
        }
    }

    /// Loads the record at `path`.
    ///
    /// A missing file yields an empty record.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the file exists but cannot be read or
    /// decoded.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display(), codec = codec.name()))]
    pub async fn load(
        path: impl AsRef<Path>,
        codec: Arc<dyn MetadataCodec>,
    ) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no metadata on disk, starting from an empty record");
                return Ok(Self::empty(path, codec));
            }
            Err(err) => return Err(MetadataError::io(path, err)),
        };

        let record = codec
            .decode(&bytes)
            .map_err(|err| MetadataError::Decode {
                path: path.to_path_buf(),
                codec: codec.name(),
                message: err.to_string(),
            })?;
        debug!(
            resume_offset = record.resume_offset,
            has_validator = !record.validator.is_empty(),
            "metadata loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            codec,
            record,
        })
    }

    /// Side-car path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory record.
    #[must_use]
    pub fn record(&self) -> &Metadata {
        &self.record
    }

    /// Mutable access to the in-memory record; call [`save`](Self::save) to persist.
    pub fn record_mut(&mut self) -> &mut Metadata {
        &mut self.record
    }

    /// Serializes the full record and replaces the side-car file.
    ///
    /// The bytes go to a temporary sibling that is then renamed over the
    /// side-car, so readers see either the old or the new record.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on encode or IO failure.
    pub async fn save(&self) -> Result<(), MetadataError> {
        let bytes = self
            .codec
            .encode(&self.record)
            .map_err(|err| MetadataError::Encode {
                path: self.path.clone(),
                codec: self.codec.name(),
                message: err.to_string(),
            })?;

        let staging = self.staging_path();
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|err| MetadataError::io(&staging, err))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| MetadataError::io(&self.path, err))?;
        Ok(())
    }

    /// Deletes the side-car file. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the file exists but cannot be removed.
    pub async fn remove(&self) -> Result<(), MetadataError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "metadata removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MetadataError::io(&self.path, err)),
        }
    }

    /// Aligns the record with the checksum the caller now expects.
    ///
    /// A different non-empty checksum means the caller is targeting a
    /// different file than the one this record tracked: every resume field
    /// is cleared, the new checksum stored and the record saved. An empty
    /// `expected` asserts nothing and leaves the record alone.
    ///
    /// Returns `true` when the record was reset.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the reset record cannot be saved.
    pub async fn reconcile_expected_checksum(
        &mut self,
        expected: &[u8],
    ) -> Result<bool, MetadataError> {
        if expected.is_empty() || self.record.expected_full_checksum == expected {
            return Ok(false);
        }
        debug!(
            path = %self.path.display(),
            previous = %hex::encode(&self.record.expected_full_checksum),
            expected = %hex::encode(expected),
            "expected checksum changed, discarding resume state"
        );
        self.record.reset();
        self.record.expected_full_checksum = expected.to_vec();
        self.save().await?;
        Ok(true)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Serializes checksum bytes as hex for human-readable formats and as raw
/// bytes otherwise.
mod checksum_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            hex::decode(text).map_err(D::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

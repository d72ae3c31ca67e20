//! Incremental checksums fed by the digest pipeline.
//!
//! The core never inspects which algorithm it is running: the resume digest
//! is always [`ResumeChecksum`], and the verification digest is whatever
//! [`Checksum`] the caller hands to
//! [`Worker::set_verification`](crate::Worker::set_verification).
//! [`ChecksumAlgorithm`] maps user-facing names onto concrete digests for
//! the CLI.

use std::fmt;
use std::str::FromStr;

use digest::Digest;
use thiserror::Error;

/// A running digest that can report its current value without being consumed.
pub trait Checksum: Send + Sync {
    /// Feeds `data` into the running digest.
    fn update(&mut self, data: &[u8]);

    /// Returns the digest of every byte fed since the last reset.
    ///
    /// The running state is left untouched, so more data can follow.
    fn sum(&self) -> Vec<u8>;

    /// Discards all fed data.
    fn reset(&mut self);
}

/// Adapts any RustCrypto [`Digest`] into a [`Checksum`].
#[derive(Clone, Default)]
pub struct DigestChecksum<D> {
    inner: D,
}

impl<D: Digest> DigestChecksum<D> {
    /// Creates an empty running digest.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: D::new() }
    }
}

impl<D> Checksum for DigestChecksum<D>
where
    D: Digest + Clone + Send + Sync,
{
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn sum(&self) -> Vec<u8> {
        self.inner.clone().finalize().to_vec()
    }

    fn reset(&mut self) {
        self.inner = D::new();
    }
}

impl<D> fmt::Debug for DigestChecksum<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestChecksum").finish_non_exhaustive()
    }
}

/// Algorithm used for the resume digest of every transfer.
pub type ResumeChecksum = DigestChecksum<sha2::Sha256>;

/// Error returned when a checksum name is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown checksum algorithm '{name}' (expected one of: {expected})")]
pub struct UnknownAlgorithm {
    name: String,
    expected: String,
}

/// Verification algorithms selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl ChecksumAlgorithm {
    /// Every supported algorithm, in display order.
    pub const ALL: [Self; 10] = [
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Sha512_224,
        Self::Sha512_256,
        Self::Sha3_224,
        Self::Sha3_256,
        Self::Sha3_384,
        Self::Sha3_512,
    ];

    /// Canonical upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha224 => "SHA224",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
            Self::Sha512_224 => "SHA512_224",
            Self::Sha512_256 => "SHA512_256",
            Self::Sha3_224 => "SHA3_224",
            Self::Sha3_256 => "SHA3_256",
            Self::Sha3_384 => "SHA3_384",
            Self::Sha3_512 => "SHA3_512",
        }
    }

    /// Digest length in bytes.
    #[must_use]
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha224 | Self::Sha512_224 | Self::Sha3_224 => 28,
            Self::Sha256 | Self::Sha512_256 | Self::Sha3_256 => 32,
            Self::Sha384 | Self::Sha3_384 => 48,
            Self::Sha512 | Self::Sha3_512 => 64,
        }
    }

    /// Creates an empty running digest for this algorithm.
    #[must_use]
    pub fn checksum(self) -> Box<dyn Checksum> {
        match self {
            Self::Sha224 => Box::new(DigestChecksum::<sha2::Sha224>::new()),
            Self::Sha256 => Box::new(DigestChecksum::<sha2::Sha256>::new()),
            Self::Sha384 => Box::new(DigestChecksum::<sha2::Sha384>::new()),
            Self::Sha512 => Box::new(DigestChecksum::<sha2::Sha512>::new()),
            Self::Sha512_224 => Box::new(DigestChecksum::<sha2::Sha512_224>::new()),
            Self::Sha512_256 => Box::new(DigestChecksum::<sha2::Sha512_256>::new()),
            Self::Sha3_224 => Box::new(DigestChecksum::<sha3::Sha3_224>::new()),
            Self::Sha3_256 => Box::new(DigestChecksum::<sha3::Sha3_256>::new()),
            Self::Sha3_384 => Box::new(DigestChecksum::<sha3::Sha3_384>::new()),
            Self::Sha3_512 => Box::new(DigestChecksum::<sha3::Sha3_512>::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnknownAlgorithm {
                name: s.to_string(),
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

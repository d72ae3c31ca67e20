//! Resumable Downloader Core Library
//!
//! This library transfers a remote resource to a local file and survives
//! process restarts and network failures by keeping a small side-car record
//! of how much of the file has been durably written and hashed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Transfer worker, HTTP client, digest pipeline
//! - [`metadata`] - Side-car resume record and its encodings
//! - [`checksum`] - Incremental digests for resume and verification
//! - [`user_agent`] - User-Agent sent with every request

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checksum;
pub mod download;
pub mod metadata;
pub mod user_agent;

// Re-export commonly used types
pub use checksum::{Checksum, ChecksumAlgorithm, DigestChecksum, ResumeChecksum};
pub use download::{
    HttpClient, NoopNotifier, Notifier, Status, Worker, WorkerError, WorkerOptions,
};
pub use metadata::{
    BinaryCodec, JsonCodec, Metadata, MetadataCodec, MetadataError, MetadataStore, metadata_path,
};

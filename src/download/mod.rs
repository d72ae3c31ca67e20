//! Resumable HTTP transfers to disk.
//!
//! This module provides the [`Worker`] that performs one download and
//! everything it is configured with.
//!
//! # Features
//!
//! - Resume from the last persisted byte offset after a crash or network
//!   failure (`Range` + `If-Range`)
//! - Re-validation of partial files against a recorded prefix digest
//! - Optional final verification against a caller-supplied checksum
//! - Synchronous progress notifications on the write path
//! - Configurable timeouts (30s connect, 5min read by default)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use resumable_core::download::{Worker, WorkerOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Arc::new(WorkerOptions::builder().sync_threshold(1 << 20).build());
//! let mut worker = Worker::new("https://example.com/paper.pdf", "paper.pdf", options);
//! let status = worker.run().await?;
//! println!("{}: {status}", worker.destination().display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod options;
mod pipeline;
mod status;
mod worker;

pub use client::HttpClient;
pub use constants::DEFAULT_SYNC_THRESHOLD;
pub use error::WorkerError;
pub use options::{WorkerOptions, WorkerOptionsBuilder};
pub use status::{NoopNotifier, Notifier, Status};
pub use worker::Worker;

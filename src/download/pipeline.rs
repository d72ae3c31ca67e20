//! Fan-out write path shared by downloads and local verification passes.
//!
//! Every chunk of a transfer goes through the same ordered sinks:
//!
//! 1. the destination file (absent while re-verifying an existing file)
//! 2. the resume digest
//! 3. the verification digest, when the caller attached one
//! 4. the [`InstrumentedWriter`], which checkpoints metadata and notifies
//!
//! The first failing sink aborts the write, so digest state can never run
//! ahead of the file.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::trace;

use super::WorkerError;
use super::status::{Notifier, Status};
use crate::checksum::{Checksum, ResumeChecksum};
use crate::metadata::{MetadataError, MetadataStore};

/// When the instrumented writer persists resume state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncMode {
    /// Persist once the bytes written since the last checkpoint reach the
    /// configured threshold.
    Threshold,
    /// Persist after every write.
    Forced,
    /// Never persist. Used while re-reading bytes that are not yet trusted.
    Suspended,
}

/// Destination file wrapped for buffered appends.
#[derive(Debug)]
pub(crate) struct FileSink {
    path: PathBuf,
    file: BufWriter<File>,
}

impl FileSink {
    pub(crate) fn new(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), WorkerError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| WorkerError::io(&self.path, e))
    }

    /// Pushes buffered bytes to the OS and waits until they reach storage.
    async fn sync(&mut self) -> Result<(), WorkerError> {
        self.file
            .flush()
            .await
            .map_err(|e| WorkerError::io(&self.path, e))?;
        self.file
            .get_ref()
            .sync_data()
            .await
            .map_err(|e| WorkerError::io(&self.path, e))
    }
}

/// Counts bytes, persists resume state and reports progress.
pub(crate) struct InstrumentedWriter<'a> {
    store: MetadataStore,
    notifier: &'a dyn Notifier,
    status: Status,
    mode: SyncMode,
    threshold: u64,
    offset: u64,
    size: Option<u64>,
    unsynced: u64,
    checkpoints: u64,
}

impl<'a> InstrumentedWriter<'a> {
    fn new(store: MetadataStore, notifier: &'a dyn Notifier, threshold: u64) -> Self {
        Self {
            store,
            notifier,
            status: Status::Work,
            mode: SyncMode::Forced,
            threshold: threshold.max(1),
            offset: 0,
            size: None,
            unsynced: 0,
            checkpoints: 0,
        }
    }

    /// Accounts for `len` new bytes; returns whether a checkpoint is due.
    fn advance(&mut self, len: u64) -> bool {
        self.offset += len;
        self.unsynced += len;
        match self.mode {
            SyncMode::Forced => true,
            SyncMode::Threshold => self.unsynced >= self.threshold,
            SyncMode::Suspended => false,
        }
    }

    async fn persist(&mut self, resume_digest: Vec<u8>) -> Result<(), MetadataError> {
        let record = self.store.record_mut();
        record.resume_offset = self.offset;
        record.resume_digest = resume_digest;
        self.store.save().await?;
        self.unsynced = 0;
        self.checkpoints += 1;
        trace!(
            offset = self.offset,
            checkpoints = self.checkpoints,
            "resume state persisted"
        );
        Ok(())
    }

    fn notify(&self) {
        self.notifier.notify(self.status, None, self.offset, self.size);
    }
}

/// Ordered fan-out of one transfer's writes.
///
/// Owns the metadata store for the duration of an attempt so that every
/// checkpoint records the digest of exactly the bytes accounted for.
pub(crate) struct DigestPipeline<'a> {
    file: Option<FileSink>,
    resume: ResumeChecksum,
    verify: &'a mut Option<Box<dyn Checksum>>,
    writer: InstrumentedWriter<'a>,
}

impl<'a> DigestPipeline<'a> {
    pub(crate) fn new(
        store: MetadataStore,
        verify: &'a mut Option<Box<dyn Checksum>>,
        notifier: &'a dyn Notifier,
        threshold: u64,
    ) -> Self {
        if let Some(checksum) = verify.as_mut() {
            checksum.reset();
        }
        Self {
            file: None,
            resume: ResumeChecksum::new(),
            verify,
            writer: InstrumentedWriter::new(store, notifier, threshold),
        }
    }

    /// Drops all digest and offset state, as for a transfer starting at byte zero.
    pub(crate) fn rewind(&mut self) {
        self.resume.reset();
        if let Some(checksum) = self.verify.as_mut() {
            checksum.reset();
        }
        self.writer.offset = 0;
        self.writer.unsynced = 0;
        self.writer.size = None;
    }

    /// Sets the status reported with each write and the checkpoint policy.
    pub(crate) fn set_phase(&mut self, status: Status, mode: SyncMode) {
        self.writer.status = status;
        self.writer.mode = mode;
    }

    /// Total size reported to the notifier.
    pub(crate) fn set_size(&mut self, size: Option<u64>) {
        self.writer.size = size;
    }

    /// Routes subsequent writes into `file`.
    pub(crate) fn attach(&mut self, file: FileSink) {
        self.file = Some(file);
    }

    /// Flushes and releases the destination file.
    pub(crate) async fn detach(&mut self) -> Result<(), WorkerError> {
        if let Some(mut file) = self.file.take() {
            file.file
                .flush()
                .await
                .map_err(|e| WorkerError::io(&file.path, e))?;
        }
        Ok(())
    }

    /// Passes `chunk` through every sink in order.
    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<(), WorkerError> {
        if let Some(file) = self.file.as_mut() {
            file.write(chunk).await?;
        }
        self.resume.update(chunk);
        if let Some(checksum) = self.verify.as_mut() {
            checksum.update(chunk);
        }
        if self.writer.advance(chunk.len() as u64) {
            self.checkpoint().await?;
        }
        self.writer.notify();
        Ok(())
    }

    /// Persists the current offset and resume digest.
    ///
    /// The destination is synced first so the record never claims bytes the
    /// file does not durably hold.
    pub(crate) async fn checkpoint(&mut self) -> Result<(), WorkerError> {
        if let Some(file) = self.file.as_mut() {
            file.sync().await?;
        }
        self.writer.persist(self.resume.sum()).await?;
        Ok(())
    }

    /// Bytes accounted for since the last rewind.
    pub(crate) fn offset(&self) -> u64 {
        self.writer.offset
    }

    pub(crate) fn size(&self) -> Option<u64> {
        self.writer.size
    }

    pub(crate) fn resume_sum(&self) -> Vec<u8> {
        self.resume.sum()
    }

    /// Current verification digest, if one is attached.
    pub(crate) fn verify_sum(&self) -> Option<Vec<u8>> {
        self.verify.as_ref().map(|checksum| checksum.sum())
    }

    #[cfg(test)]
    pub(crate) fn checkpoints(&self) -> u64 {
        self.writer.checkpoints
    }

    pub(crate) fn store(&self) -> &MetadataStore {
        &self.writer.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut MetadataStore {
        &mut self.writer.store
    }
}

//! The transfer worker: state machine and resume protocol.
//!
//! A [`Worker`] owns one logical download. Each call to [`Worker::run`]
//! decides between a fresh transfer and a resume from on-disk state, drives
//! the digest pipeline, and settles in `Completed`, `Exists` or `Error`.
//!
//! Decision order for one attempt:
//!
//! - destination absent: create it exclusively and download from byte zero
//! - destination present without an expected checksum or recorded progress:
//!   truncate and download from byte zero
//! - otherwise re-hash the recorded prefix; a stale prefix falls back to a
//!   whole-file check, a good one to hashing the remainder. A file that
//!   already matches the expected checksum finishes as `Exists` without any
//!   request
//! - anything else continues with a ranged request from the end of the file

use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

use super::WorkerError;
use super::client::{self, RangeRequest};
use super::constants::VERIFY_BUFFER_SIZE;
use super::options::WorkerOptions;
use super::pipeline::{DigestPipeline, FileSink, SyncMode};
use super::status::Status;
use crate::checksum::Checksum;
use crate::metadata::{MetadataStore, metadata_path};

/// Downloads one URL to one destination, resuming across runs.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use resumable_core::{ChecksumAlgorithm, Worker, WorkerOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = Arc::new(WorkerOptions::default());
/// let mut worker = Worker::new("https://example.com/image.iso", "image.iso", options);
/// let expected = hex::decode("5f70bf18a086007016e948b04aed3b82103a36bea41755b6cddfaf10ace3c6ef")?;
/// worker.set_verification(Some(ChecksumAlgorithm::Sha256.checksum()), expected)?;
/// let status = worker.run().await?;
/// println!("{status}");
/// # Ok(())
/// # }
/// ```
pub struct Worker {
    url: String,
    destination: PathBuf,
    options: Arc<WorkerOptions>,
    status: Status,
    error: Option<WorkerError>,
    verification: Option<Box<dyn Checksum>>,
    expected: Vec<u8>,
}

impl Worker {
    /// Binds a new idle worker to `url` and `destination`.
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        options: Arc<WorkerOptions>,
    ) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            options,
            status: Status::Idle,
            error: None,
            verification: None,
            expected: Vec::new(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Error that ended the last attempt, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&WorkerError> {
        self.error.as_ref()
    }

    /// Attaches the final verification digest and the checksum it must
    /// produce for the complete file.
    ///
    /// An empty `expected` disables the final comparison; the digest is then
    /// still computed but never judged. Without a digest `expected` is
    /// ignored, since nothing could ever match it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Busy`] unless the worker is `Idle`.
    pub fn set_verification(
        &mut self,
        checksum: Option<Box<dyn Checksum>>,
        expected: impl Into<Vec<u8>>,
    ) -> Result<(), WorkerError> {
        if self.status != Status::Idle {
            return Err(WorkerError::Busy);
        }
        self.expected = if checksum.is_some() {
            expected.into()
        } else {
            Vec::new()
        };
        self.verification = checksum;
        Ok(())
    }

    /// Rebinds the worker to a new transfer and returns it to `Idle`.
    ///
    /// The last error and any verification settings are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Busy`] while an attempt is in flight.
    pub fn reset(
        &mut self,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Result<(), WorkerError> {
        if !self.status.is_settled() {
            return Err(WorkerError::Busy);
        }
        self.url = url.into();
        self.destination = destination.into();
        self.error = None;
        self.verification = None;
        self.expected.clear();
        self.transition(Status::Idle, 0, None);
        Ok(())
    }

    /// Performs one transfer attempt and returns once it has settled.
    ///
    /// Allowed from `Idle` and from any settled status, in which case the
    /// attempt continues from whatever state is on disk. Returns the
    /// terminal status: [`Status::Completed`] when bytes were fetched,
    /// [`Status::Exists`] when the destination already matched.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Busy`] if a previous attempt never settled (its future
    /// was dropped mid-transfer). Every other error also moves the worker to
    /// [`Status::Error`], is reported to the notifier and is retained for
    /// [`error`](Self::error).
    #[instrument(skip(self), fields(url = %self.url, destination = %self.destination.display()))]
    pub async fn run(&mut self) -> Result<Status, WorkerError> {
        if !self.status.is_settled() {
            return Err(WorkerError::Busy);
        }
        self.error = None;
        self.transition(Status::Work, 0, None);

        let outcome = Transfer::new(
            &self.url,
            &self.destination,
            &self.options,
            &self.expected,
            &mut self.verification,
        )
        .execute()
        .await;

        match outcome {
            Ok(summary) => {
                info!(
                    status = %summary.status,
                    bytes = summary.offset,
                    "transfer settled"
                );
                self.transition(summary.status, summary.offset, summary.size);
                Ok(summary.status)
            }
            Err(error) => {
                warn!(error = %error, "transfer failed");
                self.status = Status::Error;
                self.options
                    .notifier()
                    .notify(Status::Error, Some(&error), 0, None);
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn transition(&mut self, status: Status, offset: u64, size: Option<u64>) {
        self.status = status;
        self.options.notifier().notify(status, None, offset, size);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("url", &self.url)
            .field("destination", &self.destination)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("verifying", &self.verification.is_some())
            .field("expected", &hex::encode(&self.expected))
            .finish_non_exhaustive()
    }
}

/// How a successful attempt ended.
struct Summary {
    status: Status,
    offset: u64,
    size: Option<u64>,
}

/// State of a single `run()` call.
struct Transfer<'w> {
    url: &'w str,
    destination: &'w Path,
    options: &'w WorkerOptions,
    expected: &'w [u8],
    pipeline: DigestPipeline<'w>,
}

impl<'w> Transfer<'w> {
    fn new(
        url: &'w str,
        destination: &'w Path,
        options: &'w WorkerOptions,
        expected: &'w [u8],
        verification: &'w mut Option<Box<dyn Checksum>>,
    ) -> Self {
        let store =
            MetadataStore::empty(metadata_path(destination), Arc::clone(options.codec()));
        let pipeline = DigestPipeline::new(
            store,
            verification,
            options.notifier(),
            options.sync_threshold(),
        );
        Self {
            url,
            destination,
            options,
            expected,
            pipeline,
        }
    }

    async fn execute(mut self) -> Result<Summary, WorkerError> {
        let created = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(self.destination)
            .await;
        let status = match created {
            Ok(file) => {
                debug!("destination absent, starting fresh download");
                self.download(file).await?;
                Status::Completed
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.resume().await?,
            Err(e) => return Err(WorkerError::io(self.destination, e)),
        };
        Ok(Summary {
            status,
            offset: self.pipeline.offset(),
            size: self.pipeline.size(),
        })
    }

    /// Full GET into `file`, which must be empty.
    async fn download(&mut self, file: File) -> Result<(), WorkerError> {
        self.pipeline.rewind();
        let response = self
            .cancellable(self.options.client().get(self.url, self.options.headers(), None))
            .await??;
        if response.status() != StatusCode::OK {
            return Err(client::remote_error(self.url, response).await);
        }

        let store = self.pipeline.store_mut();
        let record = store.record_mut();
        record.reset();
        record.validator = client::validator(response.headers());
        record.expected_full_checksum = self.expected.to_vec();
        store.save().await?;

        self.pipeline.set_size(response.content_length());
        self.pipeline.set_phase(Status::Download, SyncMode::Threshold);
        self.pipeline.attach(FileSink::new(self.destination, file));
        self.stream(response).await?;

        if let Some(actual) = self.mismatch() {
            self.pipeline.checkpoint().await?;
            self.pipeline.detach().await?;
            return Err(WorkerError::checksum_mismatch(
                self.destination,
                self.expected,
                &actual,
            ));
        }
        self.pipeline.detach().await?;
        self.discard_metadata().await;
        Ok(())
    }

    /// Continues from an existing destination file.
    async fn resume(&mut self) -> Result<Status, WorkerError> {
        let store = MetadataStore::load(
            metadata_path(self.destination),
            Arc::clone(self.options.codec()),
        )
        .await?;
        *self.pipeline.store_mut() = store;

        if self.expected.is_empty() && self.pipeline.store().record().resume_offset == 0 {
            debug!("no checksum and no recorded progress, existing file is untrusted");
            self.restart().await?;
            return Ok(Status::Completed);
        }
        if self
            .pipeline
            .store_mut()
            .reconcile_expected_checksum(self.expected)
            .await?
        {
            debug!("recorded transfer targeted a different checksum");
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.destination)
            .await
            .map_err(|e| WorkerError::io(self.destination, e))?;
        self.pipeline.rewind();
        // Bytes below the recorded offset are untrusted until compared.
        self.pipeline.set_phase(Status::Work, SyncMode::Suspended);

        let record = self.pipeline.store().record();
        if record.has_resume_point() {
            let resume_offset = record.resume_offset;
            let resume_digest = record.resume_digest.clone();
            debug!(resume_offset, "verifying recorded prefix");
            let read = self.hash_file(&mut file, Some(resume_offset)).await?;
            if read != resume_offset || self.pipeline.resume_sum() != resume_digest {
                debug!(read, resume_offset, "recorded prefix is stale, checking whole file");
                self.hash_file(&mut file, None).await?;
                if self.matches_expected() {
                    self.discard_metadata().await;
                    return Ok(Status::Exists);
                }
                drop(file);
                self.restart().await?;
                return Ok(Status::Completed);
            }
        }

        self.pipeline.set_phase(Status::Work, SyncMode::Forced);
        self.hash_file(&mut file, None).await?;
        if self.matches_expected() {
            debug!("existing file already matches expected checksum");
            self.discard_metadata().await;
            return Ok(Status::Exists);
        }
        self.resume_range(file).await?;
        Ok(Status::Completed)
    }

    /// Ranged GET appending to `file`, positioned at its end.
    async fn resume_range(&mut self, file: File) -> Result<(), WorkerError> {
        let offset = self.pipeline.offset();
        let validator = self.pipeline.store().record().validator.clone();
        debug!(offset, has_validator = !validator.is_empty(), "requesting remaining bytes");
        let range = RangeRequest {
            offset,
            validator: &validator,
        };
        let response = self
            .cancellable(
                self.options
                    .client()
                    .get(self.url, self.options.headers(), Some(range)),
            )
            .await??;

        match response.status() {
            StatusCode::PARTIAL_CONTENT
                if client::content_range_start(response.headers())
                    .is_some_and(|start| start != offset) =>
            {
                debug!(offset, "server answered with a different range, starting over");
                drop(response);
                drop(file);
                self.restart().await
            }
            StatusCode::PARTIAL_CONTENT => {
                let size = client::content_range_total(response.headers())
                    .or_else(|| response.content_length().map(|len| len + offset));
                self.pipeline.set_size(size);
                self.pipeline.set_phase(Status::Download, SyncMode::Threshold);
                self.pipeline.attach(FileSink::new(self.destination, file));
                self.stream(response).await?;
                self.pipeline.detach().await?;

                if self.mismatch().is_some() {
                    debug!("resumed file fails its checksum, starting over");
                    return self.restart().await;
                }
                self.discard_metadata().await;
                Ok(())
            }
            StatusCode::OK | StatusCode::RANGE_NOT_SATISFIABLE => {
                debug!(status = response.status().as_u16(), "server rejected the range");
                drop(response);
                drop(file);
                self.restart().await
            }
            _ => Err(client::remote_error(self.url, response).await),
        }
    }

    /// Truncate-restart: drop every trace of partial progress and download
    /// from byte zero.
    async fn restart(&mut self) -> Result<(), WorkerError> {
        debug!("discarding partial download");
        self.pipeline.store().remove().await?;
        let file = File::create(self.destination)
            .await
            .map_err(|e| WorkerError::io(self.destination, e))?;
        self.download(file).await
    }

    /// Feeds the destination's bytes to the pipeline, up to `limit` bytes
    /// when given. Returns the number of bytes read.
    async fn hash_file(
        &mut self,
        file: &mut File,
        limit: Option<u64>,
    ) -> Result<u64, WorkerError> {
        let mut buf = vec![0u8; VERIFY_BUFFER_SIZE];
        let mut total: u64 = 0;
        loop {
            let want = match limit {
                Some(limit) if total >= limit => break,
                Some(limit) => {
                    let remaining = usize::try_from(limit - total).unwrap_or(usize::MAX);
                    buf.len().min(remaining)
                }
                None => buf.len(),
            };
            let read = file
                .read(&mut buf[..want])
                .await
                .map_err(|e| WorkerError::io(self.destination, e))?;
            if read == 0 {
                break;
            }
            self.pipeline.write(&buf[..read]).await?;
            total += read as u64;
        }
        Ok(total)
    }

    async fn stream(&mut self, response: Response) -> Result<(), WorkerError> {
        let mut body = response.bytes_stream();
        loop {
            let next = match self.cancellable(body.next()).await {
                Ok(next) => next,
                Err(error) => return Err(self.interrupted(error).await),
            };
            match next {
                Some(Ok(chunk)) => self.pipeline.write(&chunk).await?,
                Some(Err(e)) => {
                    let error = WorkerError::transport(self.url, e);
                    return Err(self.interrupted(error).await);
                }
                None => return Ok(()),
            }
        }
    }

    /// Tail checkpoint after a broken body stream, so the record covers
    /// every byte already written.
    async fn interrupted(&mut self, error: WorkerError) -> WorkerError {
        debug!(offset = self.pipeline.offset(), error = %error, "transfer interrupted");
        if let Err(e) = self.pipeline.checkpoint().await {
            warn!(error = %e, "failed to persist resume state after interruption");
        }
        error
    }

    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output, WorkerError> {
        let Some(token) = self.options.cancellation() else {
            return Ok(future.await);
        };
        tokio::select! {
            biased;
            () = token.cancelled() => Err(WorkerError::cancelled(self.url)),
            output = future => Ok(output),
        }
    }

    /// Whether the verification digest equals a non-empty expected checksum.
    fn matches_expected(&self) -> bool {
        !self.expected.is_empty()
            && self
                .pipeline
                .verify_sum()
                .is_some_and(|sum| sum == self.expected)
    }

    /// Verification digest when it contradicts a non-empty expected checksum.
    fn mismatch(&self) -> Option<Vec<u8>> {
        if self.expected.is_empty() {
            return None;
        }
        self.pipeline
            .verify_sum()
            .filter(|sum| sum.as_slice() != self.expected)
    }

    async fn discard_metadata(&self) {
        if let Err(e) = self.pipeline.store().remove().await {
            warn!(error = %e, "failed to remove metadata after transfer");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::download::Notifier;

    #[derive(Default)]
    struct Transitions(Mutex<Vec<Status>>);

    impl Notifier for Transitions {
        fn notify(&self, status: Status, error: Option<&WorkerError>, _: u64, _: Option<u64>) {
            assert_eq!(error.is_some(), status == Status::Error);
            let mut seen = self.0.lock().unwrap();
            if seen.last() != Some(&status) {
                seen.push(status);
            }
        }
    }

    fn sha256(data: &[u8]) -> Vec<u8> {
        let mut checksum = ChecksumAlgorithm::Sha256.checksum();
        checksum.update(data);
        checksum.sum()
    }

    fn body() -> Vec<u8> {
        (0..=255u8).cycle().take(10_000).collect()
    }

    #[test]
    fn test_invalid_url_is_recorded_as_error() {
        let dir = TempDir::new().unwrap();
        let mut worker = Worker::new(
            "not a url",
            dir.path().join("out.bin"),
            Arc::new(WorkerOptions::default()),
        );

        let result = tokio_test::block_on(worker.run());

        assert!(matches!(result, Err(WorkerError::InvalidUrl { .. })));
        assert_eq!(worker.status(), Status::Error);
        assert!(!worker.error().is_some_and(WorkerError::is_retryable));
    }

    #[tokio::test]
    async fn test_fresh_download_reports_phases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("data.bin");
        let transitions = Arc::new(Transitions::default());
        let options = WorkerOptions::builder()
            .notifier(transitions.clone())
            .sync_threshold(1024)
            .build();
        let mut worker = Worker::new(
            format!("{}/data.bin", server.uri()),
            &destination,
            Arc::new(options),
        );

        let status = worker.run().await.unwrap();

        assert_eq!(status, Status::Completed);
        assert_eq!(std::fs::read(&destination).unwrap(), body());
        assert!(!metadata_path(&destination).exists());
        assert_eq!(
            *transitions.0.lock().unwrap(),
            vec![Status::Work, Status::Download, Status::Completed]
        );
    }

    #[test]
    fn test_expected_checksum_ignored_without_digest() {
        let mut worker = Worker::new(
            "https://example.com/a.bin",
            "a.bin",
            Arc::new(WorkerOptions::default()),
        );

        worker.set_verification(None, vec![1, 2, 3]).unwrap();
        assert!(worker.expected.is_empty());

        let digest = Some(ChecksumAlgorithm::Sha256.checksum());
        worker.set_verification(digest, vec![1, 2, 3]).unwrap();
        assert_eq!(worker.expected, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_set_verification_requires_idle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut worker = Worker::new(
            server.uri(),
            dir.path().join("abc"),
            Arc::new(WorkerOptions::default()),
        );
        worker.run().await.unwrap();

        let result = worker.set_verification(None, vec![1, 2, 3]);
        assert!(matches!(result, Err(WorkerError::Busy)));
    }

    #[tokio::test]
    async fn test_reset_rebinds_and_clears_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut worker = Worker::new(
            server.uri(),
            dir.path().join("missing"),
            Arc::new(WorkerOptions::default()),
        );
        let error = worker.run().await.unwrap_err();
        assert_eq!(error.http_status(), Some(404));
        assert_eq!(worker.status(), Status::Error);
        assert!(worker.error().is_some());

        worker.reset("https://example.invalid/other", dir.path().join("other")).unwrap();

        assert_eq!(worker.status(), Status::Idle);
        assert!(worker.error().is_none());
        assert_eq!(worker.url(), "https://example.invalid/other");
        assert_eq!(worker.destination(), dir.path().join("other"));
    }

    #[tokio::test]
    async fn test_busy_when_previous_attempt_never_settled() {
        let dir = TempDir::new().unwrap();
        let mut worker = Worker::new(
            "http://127.0.0.1:9/never",
            dir.path().join("never"),
            Arc::new(WorkerOptions::default()),
        );
        worker.status = Status::Download;

        assert!(matches!(worker.run().await, Err(WorkerError::Busy)));
        assert!(matches!(worker.reset("u", "d"), Err(WorkerError::Busy)));
        assert!(worker.error().is_none(), "busy is not recorded");
    }

    #[tokio::test]
    async fn test_cancelled_transfer_keeps_partial_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body())
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let token = tokio_util::sync::CancellationToken::new();
        let options = WorkerOptions::builder().cancellation(token.clone()).build();
        let mut worker = Worker::new(server.uri(), dir.path().join("slow"), Arc::new(options));

        token.cancel();
        let error = worker.run().await.unwrap_err();

        assert!(matches!(error, WorkerError::Cancelled { .. }));
        assert!(error.is_retryable());
        assert!(dir.path().join("slow").exists());
    }

    #[tokio::test]
    async fn test_resume_sends_validator_from_first_response() {
        let data = body();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("range"))
            .and(header("if-range", "\"v1\""))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 4000-9999/10000")
                    .set_body_bytes(data[4000..].to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("part.bin");
        std::fs::write(&destination, &data[..4000]).unwrap();
        let options = Arc::new(WorkerOptions::default());
        let mut store =
            MetadataStore::empty(metadata_path(&destination), Arc::clone(options.codec()));
        store.record_mut().expected_full_checksum = sha256(&data);
        store.record_mut().validator = "\"v1\"".to_string();
        store.record_mut().resume_offset = 4000;
        store.record_mut().resume_digest = sha256(&data[..4000]);
        store.save().await.unwrap();

        let mut worker = Worker::new(server.uri(), &destination, options);
        worker
            .set_verification(Some(ChecksumAlgorithm::Sha256.checksum()), sha256(&data))
            .unwrap();

        assert_eq!(worker.run().await.unwrap(), Status::Completed);
        assert_eq!(std::fs::read(&destination).unwrap(), data);
        assert!(!metadata_path(&destination).exists());
    }
}

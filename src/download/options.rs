//! Immutable per-worker configuration.
//!
//! Options are assembled once through [`WorkerOptions::builder`] and never
//! mutated afterwards; many workers may share one value behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use super::HttpClient;
use super::constants::DEFAULT_SYNC_THRESHOLD;
use super::status::{NoopNotifier, Notifier};
use crate::metadata::{BinaryCodec, MetadataCodec};

/// Configuration shared by every attempt of a worker.
#[derive(Clone)]
pub struct WorkerOptions {
    client: HttpClient,
    headers: HeaderMap,
    notifier: Arc<dyn Notifier>,
    codec: Arc<dyn MetadataCodec>,
    sync_threshold: u64,
    cancellation: Option<CancellationToken>,
}

impl WorkerOptions {
    /// Starts a builder populated with defaults.
    #[must_use]
    pub fn builder() -> WorkerOptionsBuilder {
        WorkerOptionsBuilder::default()
    }

    /// HTTP client used for every request.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Extra headers sent with every request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Receiver of status transitions and progress.
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Encoding of side-car metadata files.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn MetadataCodec> {
        &self.codec
    }

    /// Bytes written between two metadata checkpoints.
    #[must_use]
    pub fn sync_threshold(&self) -> u64 {
        self.sync_threshold
    }

    /// Token that aborts an in-flight transfer when cancelled.
    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("headers", &self.headers.len())
            .field("codec", &self.codec.name())
            .field("sync_threshold", &self.sync_threshold)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkerOptions`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use resumable_core::download::WorkerOptions;
/// use resumable_core::metadata::JsonCodec;
///
/// let options = WorkerOptions::builder()
///     .codec(Arc::new(JsonCodec))
///     .sync_threshold(1024 * 1024)
///     .build();
/// assert_eq!(options.sync_threshold(), 1024 * 1024);
/// ```
#[derive(Default)]
#[must_use]
pub struct WorkerOptionsBuilder {
    client: Option<HttpClient>,
    headers: HeaderMap,
    notifier: Option<Arc<dyn Notifier>>,
    codec: Option<Arc<dyn MetadataCodec>>,
    sync_threshold: Option<u64>,
    cancellation: Option<CancellationToken>,
}

impl WorkerOptionsBuilder {
    /// Uses `client` instead of a default [`HttpClient`].
    pub fn client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sends `headers` with every request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Reports progress to `notifier`.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Encodes metadata with `codec` (binary by default).
    pub fn codec(mut self, codec: Arc<dyn MetadataCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Checkpoints metadata every `bytes` written. Zero is raised to one.
    pub fn sync_threshold(mut self, bytes: u64) -> Self {
        self.sync_threshold = Some(bytes.max(1));
        self
    }

    /// Aborts in-flight transfers when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> WorkerOptions {
        WorkerOptions {
            client: self.client.unwrap_or_default(),
            headers: self.headers,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier)),
            codec: self.codec.unwrap_or_else(|| Arc::new(BinaryCodec)),
            sync_threshold: self.sync_threshold.unwrap_or(DEFAULT_SYNC_THRESHOLD),
            cancellation: self.cancellation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::JsonCodec;

    #[test]
    fn test_default_options() {
        let options = WorkerOptions::default();
        assert_eq!(options.sync_threshold(), DEFAULT_SYNC_THRESHOLD);
        assert_eq!(options.codec().name(), "binary");
        assert!(options.headers().is_empty());
        assert!(options.cancellation().is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let token = CancellationToken::new();
        let options = WorkerOptions::builder()
            .codec(Arc::new(JsonCodec))
            .sync_threshold(4096)
            .cancellation(token.clone())
            .build();
        assert_eq!(options.codec().name(), "json");
        assert_eq!(options.sync_threshold(), 4096);
        token.cancel();
        assert!(options.cancellation().is_some_and(CancellationToken::is_cancelled));
    }

    #[test]
    fn test_zero_sync_threshold_is_raised() {
        let options = WorkerOptions::builder().sync_threshold(0).build();
        assert_eq!(options.sync_threshold(), 1);
    }
}

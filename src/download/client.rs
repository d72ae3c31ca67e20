//! HTTP client wrapper for plain and ranged transfers.
//!
//! This module provides the [`HttpClient`] used by every worker, plus the
//! header interpretation the resume protocol depends on: the revalidation
//! token stored in metadata, the true total size announced by
//! `Content-Range`, and the bounded body excerpt kept in remote errors.

use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, ETAG, HeaderMap, IF_RANGE, LAST_MODIFIED, RANGE};
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

use super::WorkerError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, REMOTE_ERROR_BODY_LIMIT};
use crate::user_agent;

/// HTTP client shared by workers.
///
/// Created once and cloned freely; clones share the underlying connection
/// pool.
///
/// # Example
///
/// ```no_run
/// use resumable_core::download::HttpClient;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let default_client = HttpClient::new();
/// let patient_client =
///     HttpClient::with_timeouts(Duration::from_secs(60), Duration::from_secs(3600))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Byte-range continuation of a partially downloaded resource.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RangeRequest<'a> {
    /// First byte wanted (current length of the destination).
    pub offset: u64,
    /// Validator recorded when the partial download began; empty for none.
    pub validator: &'a str,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - No transparent decompression, so byte offsets match the wire
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Issues a GET for `url`, optionally continuing at a byte offset.
    ///
    /// Non-success statuses are returned as responses: interpreting them is
    /// the worker's job.
    #[instrument(level = "debug", skip(self, headers), fields(url = %url))]
    pub(crate) async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        range: Option<RangeRequest<'_>>,
    ) -> Result<Response, WorkerError> {
        let parsed = Url::parse(url).map_err(|_| WorkerError::invalid_url(url))?;

        let mut request = self.client.get(parsed).headers(headers.clone());
        if let Some(range) = range {
            request = request.header(RANGE, format!("bytes={}-", range.offset));
            if !range.validator.is_empty() {
                request = request.header(IF_RANGE, range.validator);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkerError::transport(url, e))?;
        debug!(status = response.status().as_u16(), "response headers received");
        Ok(response)
    }
}

/// Extracts the revalidation token for later `If-Range` requests.
///
/// `Last-Modified` is preferred. A strong `ETag` is used when no date is
/// present; weak tags are never valid in `If-Range` and are ignored.
pub(crate) fn validator(headers: &HeaderMap) -> String {
    if let Some(modified) = header_str(headers, LAST_MODIFIED.as_str()) {
        return modified.to_string();
    }
    header_str(headers, ETAG.as_str())
        .filter(|tag| !tag.starts_with("W/"))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Total resource size from `Content-Range: bytes <a>-<b>/<total>`.
///
/// Returns `None` when the header is absent, malformed, or the total is `*`.
pub(crate) fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = header_str(headers, CONTENT_RANGE.as_str())?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// First byte position from `Content-Range: bytes <a>-<b>/<total>`.
pub(crate) fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = header_str(headers, CONTENT_RANGE.as_str())?;
    let (start, _) = value.strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}

/// Builds a [`WorkerError::Remote`] carrying at most
/// [`REMOTE_ERROR_BODY_LIMIT`] bytes of the response body.
pub(crate) async fn remote_error(url: &str, mut response: Response) -> WorkerError {
    let status = response.status().as_u16();
    let mut excerpt = Vec::new();
    while excerpt.len() < REMOTE_ERROR_BODY_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = REMOTE_ERROR_BODY_LIMIT - excerpt.len();
                excerpt.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(error) => {
                debug!(%error, "failed to read error body");
                break;
            }
        }
    }
    let body = String::from_utf8_lossy(&excerpt).trim().to_string();
    WorkerError::remote(url, status, body)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_validator_prefers_last_modified() {
        let map = headers(&[
            ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("etag", "\"abc\""),
        ]);
        assert_eq!(validator(&map), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn test_validator_falls_back_to_strong_etag() {
        assert_eq!(validator(&headers(&[("etag", "\"abc\"")])), "\"abc\"");
    }

    #[test]
    fn test_validator_ignores_weak_etag() {
        assert_eq!(validator(&headers(&[("etag", "W/\"abc\"")])), "");
    }

    #[test]
    fn test_content_range_total_parses_total() {
        let map = headers(&[("content-range", "bytes 100-199/1000")]);
        assert_eq!(content_range_total(&map), Some(1000));
    }

    #[test]
    fn test_content_range_total_ignores_unknown_total() {
        let map = headers(&[("content-range", "bytes 100-199/*")]);
        assert_eq!(content_range_total(&map), None);
        assert_eq!(content_range_total(&HeaderMap::new()), None);
    }

    #[test]
    fn test_content_range_start_parses_first_byte() {
        let map = headers(&[("content-range", "bytes 100-199/1000")]);
        assert_eq!(content_range_start(&map), Some(100));
        let unsatisfied = headers(&[("content-range", "bytes */1000")]);
        assert_eq!(content_range_start(&unsatisfied), None);
        assert_eq!(content_range_start(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_get_rejects_invalid_url() {
        let client = HttpClient::new();
        let result = client.get("not a url", &HeaderMap::new(), None).await;
        assert!(matches!(result, Err(WorkerError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_get_sends_range_and_if_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("range", "bytes=10-"))
            .and(header("if-range", "\"v1\""))
            .respond_with(ResponseTemplate::new(206))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let range = RangeRequest {
            offset: 10,
            validator: "\"v1\"",
        };
        let response = client
            .get(&url, &HeaderMap::new(), Some(range))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 206);
    }

    #[tokio::test]
    async fn test_get_omits_if_range_without_validator() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("if-range"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let range = RangeRequest {
            offset: 1,
            validator: "",
        };
        let response = client
            .get(&server.uri(), &HeaderMap::new(), Some(range))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 206);
    }

    #[tokio::test]
    async fn test_get_sends_extra_headers_and_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-token", "secret"))
            .and(header("user-agent", user_agent::default_download_user_agent().as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let response = client
            .get(&server.uri(), &headers(&[("x-token", "secret")]), None)
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_remote_error_bounds_body_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let response = client
            .get(&server.uri(), &HeaderMap::new(), None)
            .await
            .unwrap();
        match remote_error(&server.uri(), response).await {
            WorkerError::Remote { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), REMOTE_ERROR_BODY_LIMIT);
            }
            other => panic!("Expected Remote error, got: {other:?}"),
        }
    }
}

//! HTTP transport for relaying JSON-RPC requests upstream.
//!
//! A thin wrapper over `reqwest` with a global concurrency cap. Retry and
//! failover decisions belong to the endpoint pool; this layer makes exactly
//! one attempt and reports transport-level facts (status, body bytes, or a
//! fetch error).

use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

/// Transport-level failures for a single fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request could not be sent: {0}")]
    Request(String),
    #[error("concurrency limiter closed")]
    Concurrency,
}

/// Raw HTTP reply: status plus unparsed body bytes.
///
/// The body stays as bytes here so the relay layer can distinguish non-JSON
/// payloads from malformed JSON-RPC envelopes.
#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

/// Shared HTTP client with a semaphore bounding in-flight upstream requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpClient {
    /// Builds a client with connection pooling and `max_concurrent_requests`
    /// in-flight requests across all upstreams.
    pub fn new(max_concurrent_requests: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))) })
    }

    /// POSTs a JSON body and returns the raw reply.
    ///
    /// `timeout` covers the whole attempt, queueing for a permit included, so
    /// a saturated gateway fails attempts instead of stacking them up.
    pub async fn post_json(
        &self,
        url: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<HttpReply, FetchError> {
        let attempt = async {
            let _permit =
                self.permits.acquire().await.map_err(|_| FetchError::Concurrency)?;

            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(classify_reqwest_error)?;

            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(classify_reqwest_error)?;
            Ok(HttpReply { status, body })
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connection(err.to_string())
    } else {
        FetchError::Request(err.to_string())
    }
}

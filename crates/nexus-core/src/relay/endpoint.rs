//! A resolved upstream endpoint and the single-attempt relay against it.
//!
//! One attempt maps an upstream interaction into the failure taxonomy the
//! pool retries on. A JSON-RPC *error response* is deliberately not a
//! retryable failure: the node answered, and the answer belongs to the
//! client.

use crate::{
    chain::Chain,
    relay::http_client::HttpClient,
    types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponsePayload},
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};

/// Maximum upstream body bytes echoed into failure diagnostics.
const BODY_SNIPPET_LIMIT: usize = 256;

/// Ways a single relay attempt can fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayFailure {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("fetch failed: {message}")]
    InternalFetchError { message: String },

    /// Upstream answered with a non-2xx HTTP status.
    #[error("upstream returned HTTP {status}")]
    Non200Response { status: u16, body_snippet: String },

    /// Upstream answered 2xx but the body was not JSON.
    #[error("upstream returned a non-JSON body: {message}")]
    NonJsonResponse { message: String },

    /// Upstream returned a well-formed JSON-RPC error response.
    ///
    /// This is a legal answer, not a provider fault. The pool never retries
    /// it; the error object is passed through to the client.
    #[error("upstream returned JSON-RPC error {code}: {msg}", code = .error.code, msg = .error.message)]
    ErrorRpcResponse { error: JsonRpcError },

    /// Upstream returned JSON that matches neither the success nor the error
    /// shape of a JSON-RPC 2.0 response.
    #[error("upstream response matched neither success nor error shape")]
    UnknownRpcResponse { body_snippet: String },
}

impl RelayFailure {
    /// Whether the pool should move on to the next endpoint.
    ///
    /// Everything except a legal error response indicates the provider
    /// failed to answer and another provider might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RelayFailure::ErrorRpcResponse { .. })
    }

    /// Static label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RelayFailure::InternalFetchError { .. } => "internal_fetch_error",
            RelayFailure::Non200Response { .. } => "non_200_response",
            RelayFailure::NonJsonResponse { .. } => "non_json_response",
            RelayFailure::ErrorRpcResponse { .. } => "error_rpc_response",
            RelayFailure::UnknownRpcResponse { .. } => "unknown_rpc_response",
        }
    }
}

/// A provider endpoint resolved for one chain, ready to relay to.
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    pub provider: Arc<str>,
    pub chain: Arc<Chain>,
    pub url: String,
    pub ws_url: Option<String>,
}

impl RpcEndpoint {
    /// Relays one request to this endpoint and classifies the outcome.
    ///
    /// `Ok` carries the successful result payload. Every `Err` variant other
    /// than [`RelayFailure::ErrorRpcResponse`] means the provider failed to
    /// produce a legal JSON-RPC answer.
    pub async fn relay(
        &self,
        http: &HttpClient,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, RelayFailure> {
        let body = serde_json::to_vec(request).map_err(|e| RelayFailure::InternalFetchError {
            message: format!("request serialization failed: {e}"),
        })?;

        let reply = http
            .post_json(&self.url, Bytes::from(body), timeout)
            .await
            .map_err(|e| RelayFailure::InternalFetchError { message: e.to_string() })?;

        if !(200..300).contains(&reply.status) {
            return Err(RelayFailure::Non200Response {
                status: reply.status,
                body_snippet: snippet(&reply.body),
            });
        }

        let response: JsonRpcResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| RelayFailure::NonJsonResponse { message: e.to_string() })?;

        match response.payload() {
            ResponsePayload::Success(result) => Ok(result),
            ResponsePayload::Failure(error) => Err(RelayFailure::ErrorRpcResponse { error }),
            ResponsePayload::Unknown => {
                Err(RelayFailure::UnknownRpcResponse { body_snippet: snippet(&reply.body) })
            }
        }
    }
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut end = text.len().min(BODY_SNIPPET_LIMIT);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

//! JSON-RPC protocol types shared across the gateway.
//!
//! # Type Categories
//!
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: protocol conformance
//! - Gateway error codes in the `-32010..-32019` band, kept clear of the
//!   standard `-32000..-32099` server range conventions used by node software
//!
//! # Performance Notes
//!
//! - `jsonrpc` fields use `Cow<'static, str>` so constructing envelopes with the
//!   static version string allocates nothing.
//! - Request ids use `Arc<serde_json::Value>` so echoing the id into a response
//!   is a pointer copy rather than a deep clone.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Gateway-defined JSON-RPC error codes.
///
/// These identify failures produced by the gateway itself rather than by an
/// upstream node. They live outside the codes reserved by the JSON-RPC 2.0
/// specification (`-32700`, `-32600..-32603`) and avoid `-32005`, which node
/// providers conventionally use for rate limiting.
pub mod error_codes {
    /// Request body was not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Request body was JSON but not a valid JSON-RPC 2.0 request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The supplied access key did not match the configured key.
    pub const UNAUTHORIZED: i32 = -32010;
    /// The request path did not resolve to a known chain.
    pub const CHAIN_NOT_FOUND: i32 = -32011;
    /// The chain exists but is administratively disabled.
    pub const CHAIN_DISABLED: i32 = -32012;
    /// No registered provider supports the requested chain.
    pub const NO_ELIGIBLE_PROVIDER: i32 = -32013;
    /// Providers support the chain but none resolved a usable endpoint
    /// (missing keys, disabled providers).
    pub const NO_CONFIGURED_PROVIDER: i32 = -32014;
    /// Every relay attempt against upstream providers failed.
    pub const ALL_PROVIDERS_FAILED: i32 = -32015;
    /// Subscription request was malformed or unsupported.
    pub const SUBSCRIPTION_REJECTED: i32 = -32016;
}

/// JSON-RPC 2.0 request envelope.
///
/// # Performance Notes
///
/// - `jsonrpc` uses `Cow<'static, str>`; construct with [`JsonRpcRequest::new`]
///   for zero-allocation version handling.
/// - `id` uses `Arc<serde_json::Value>` so responses can echo it cheaply.
///
/// # Example
///
/// ```
/// use nexus_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("eth_blockNumber", None, json!(1));
/// assert_eq!(request.method, "eth_blockNumber");
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with zero allocation for the version string.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }

    /// Validates the envelope against JSON-RPC 2.0 structural rules.
    ///
    /// The gateway relays arbitrary methods, so only the envelope is checked:
    /// the version string must be `"2.0"`, the method must be non-empty and
    /// use the method-name character set, and the id must be a string, number,
    /// or null.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(InvalidRequest::BadVersion(self.jsonrpc.to_string()));
        }
        if self.method.is_empty() {
            return Err(InvalidRequest::EmptyMethod);
        }
        if !self.method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(InvalidRequest::BadMethod(self.method.clone()));
        }
        match self.id.as_ref() {
            serde_json::Value::String(_) |
            serde_json::Value::Number(_) |
            serde_json::Value::Null => Ok(()),
            other => Err(InvalidRequest::BadId(other.to_string())),
        }
    }
}

/// Structural validation failures for incoming requests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidRequest {
    #[error("jsonrpc version must be \"2.0\", got {0:?}")]
    BadVersion(String),
    #[error("method must not be empty")]
    EmptyMethod,
    #[error("method contains invalid characters: {0:?}")]
    BadMethod(String),
    #[error("id must be a string, number, or null, got {0}")]
    BadId(String),
}

/// JSON-RPC 2.0 response envelope.
///
/// A response carries either a `result` (success) or an `error` (failure),
/// never both. [`JsonRpcResponse::payload`] classifies which side is present.
///
/// # Example
///
/// ```
/// use nexus_core::types::JsonRpcResponse;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let ok = JsonRpcResponse::success(json!("0x1234"), Arc::new(json!(1)));
/// assert!(ok.result.is_some());
///
/// let err = JsonRpcResponse::error(-32601, "Method not found".to_string(), Arc::new(json!(1)));
/// assert!(err.error.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Arc<serde_json::Value>,
}

/// Which side of a JSON-RPC response is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// `result` present, `error` absent.
    Success(serde_json::Value),
    /// `error` present, `result` absent.
    Failure(JsonRpcError),
    /// Neither or both present - the envelope does not conform to JSON-RPC 2.0.
    Unknown,
}

impl JsonRpcResponse {
    /// Creates a successful JSON-RPC response with zero allocation for the version string.
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    /// Creates an error JSON-RPC response with zero allocation for the version string.
    #[must_use]
    pub fn error(code: i32, message: String, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
            id,
        }
    }

    /// Wraps an existing error object, echoing the given request id.
    #[must_use]
    pub fn from_error(error: JsonRpcError, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: None, error: Some(error), id }
    }

    /// Classifies the response shape.
    ///
    /// Upstream nodes occasionally return envelopes that violate JSON-RPC 2.0
    /// (both fields, or neither). Those are reported as
    /// [`ResponsePayload::Unknown`] so the relay can treat them as a provider
    /// failure instead of forwarding garbage.
    #[must_use]
    pub fn payload(&self) -> ResponsePayload {
        match (&self.result, &self.error) {
            (Some(result), None) => ResponsePayload::Success(result.clone()),
            (None, Some(error)) => ResponsePayload::Failure(error.clone()),
            _ => ResponsePayload::Unknown,
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes follow the JSON-RPC 2.0 convention (`-32700` parse error,
/// `-32600` invalid request, `-32601` method not found, `-32602` invalid
/// params, `-32603` internal error). Gateway-originated codes are listed in
/// [`error_codes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

/// Parses a `0x`-prefixed hexadecimal quantity (e.g. a block number).
///
/// Returns `None` for missing prefix, empty digits, or overflow.
#[must_use]
pub fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

//! Request orchestration: route, authorize, resolve, relay, respond.
//!
//! [`RelayHandler`] is the transport-facing surface of the core. The server
//! crate hands it a path, an optional access key, and a body; it hands back
//! an HTTP status plus a JSON body. Everything here is transport-shaped but
//! framework-free, so it is directly testable without a running server.

use crate::{
    chain::{Chain, ChainRegistry},
    relay::{RelayFailure, RelayOutcome, Relayer},
    types::{error_codes, JsonRpcRequest, JsonRpcResponse},
};
use parking_lot::RwLock;
use std::sync::Arc;

pub mod access;
pub mod routes;

pub use access::AccessLevel;
pub use routes::ChainRoute;

/// Failures the gateway produces before or instead of an upstream answer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("no chain matches this path")]
    RouteNotFound,
    #[error("chain {0} is not registered")]
    ChainNotFound(String),
    #[error("chain {0} is disabled")]
    ChainDisabled(u64),
    #[error("no provider supports chain {0}")]
    NoEligibleProvider(u64),
    #[error("providers support chain {0} but none is configured with a usable endpoint")]
    NoConfiguredProvider(u64),
    #[error("access denied")]
    Unauthorized,
}

impl GatewayError {
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::RouteNotFound | GatewayError::ChainNotFound(_) => 404,
            GatewayError::ChainDisabled(_) | GatewayError::NoEligibleProvider(_) => 400,
            GatewayError::NoConfiguredProvider(_) => 500,
            GatewayError::Unauthorized => 401,
        }
    }

    #[must_use]
    pub fn rpc_code(&self) -> i32 {
        match self {
            GatewayError::RouteNotFound | GatewayError::ChainNotFound(_) => {
                error_codes::CHAIN_NOT_FOUND
            }
            GatewayError::ChainDisabled(_) => error_codes::CHAIN_DISABLED,
            GatewayError::NoEligibleProvider(_) => error_codes::NO_ELIGIBLE_PROVIDER,
            GatewayError::NoConfiguredProvider(_) => error_codes::NO_CONFIGURED_PROVIDER,
            GatewayError::Unauthorized => error_codes::UNAUTHORIZED,
        }
    }
}

/// Transport-agnostic reply: HTTP status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl GatewayResponse {
    fn rpc_error(status: u16, code: i32, message: String, id: Arc<serde_json::Value>) -> Self {
        let body = JsonRpcResponse::error(code, message, id);
        Self { status, body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null) }
    }
}

/// The gateway's request orchestrator.
pub struct RelayHandler {
    chains: Arc<ChainRegistry>,
    relayer: Arc<Relayer>,
    access_key: Option<String>,
    last_outcome: RwLock<Option<String>>,
}

impl RelayHandler {
    #[must_use]
    pub fn new(chains: Arc<ChainRegistry>, relayer: Arc<Relayer>, access_key: Option<String>) -> Self {
        Self { chains, relayer, access_key, last_outcome: RwLock::new(None) }
    }

    /// Evaluates the access level for a supplied key.
    #[must_use]
    pub fn access_level(&self, supplied_key: Option<&str>) -> AccessLevel {
        access::evaluate(self.access_key.as_deref(), supplied_key)
    }

    /// Resolves a path to a registered, enabled chain.
    pub fn resolve_chain(&self, path: &str) -> Result<Arc<Chain>, GatewayError> {
        let route = ChainRoute::parse(path).ok_or(GatewayError::RouteNotFound)?;
        let chain = match &route {
            ChainRoute::ById(chain_id) => self.chains.get_by_id(*chain_id),
            ChainRoute::ByNames { network, name } => self.chains.get_by_names(network, name),
        }
        .ok_or_else(|| GatewayError::ChainNotFound(route.to_string()))?;

        if !chain.is_enabled {
            return Err(GatewayError::ChainDisabled(chain.chain_id));
        }
        Ok(chain)
    }

    /// Checks that at least one provider supports and resolves for the chain.
    fn check_providers(&self, chain: &Arc<Chain>) -> Result<(), GatewayError> {
        let eligible = self.relayer.factory().eligible_providers(chain.chain_id);
        if eligible.is_empty() {
            return Err(GatewayError::NoEligibleProvider(chain.chain_id));
        }
        let configured = eligible
            .iter()
            .any(|provider| provider.rpc_endpoint(chain, self.relayer.keys()).is_some());
        if !configured {
            return Err(GatewayError::NoConfiguredProvider(chain.chain_id));
        }
        Ok(())
    }

    /// Handles a POST relay request.
    pub async fn handle_post(
        &self,
        path: &str,
        supplied_key: Option<&str>,
        body: &[u8],
    ) -> GatewayResponse {
        let null_id = Arc::new(serde_json::Value::Null);

        if !self.access_level(supplied_key).allows_relay() {
            let err = GatewayError::Unauthorized;
            return GatewayResponse::rpc_error(
                err.http_status(),
                err.rpc_code(),
                err.to_string(),
                null_id,
            );
        }

        let chain = match self.resolve_chain(path).and_then(|chain| {
            self.check_providers(&chain)?;
            Ok(chain)
        }) {
            Ok(chain) => chain,
            Err(err) => {
                return GatewayResponse::rpc_error(
                    err.http_status(),
                    err.rpc_code(),
                    err.to_string(),
                    null_id,
                );
            }
        };

        let raw: serde_json::Value = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                return GatewayResponse::rpc_error(
                    400,
                    error_codes::PARSE_ERROR,
                    format!("invalid JSON: {e}"),
                    null_id,
                );
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                return GatewayResponse::rpc_error(
                    400,
                    error_codes::INVALID_REQUEST,
                    format!("invalid JSON-RPC request: {e}"),
                    null_id,
                );
            }
        };
        if let Err(e) = request.validate() {
            return GatewayResponse::rpc_error(
                400,
                error_codes::INVALID_REQUEST,
                e.to_string(),
                Arc::clone(&request.id),
            );
        }

        let outcome = self.relayer.relay(&chain, &request).await;
        self.respond(&chain, &request, outcome)
    }

    /// Relays an already-parsed request, returning only the JSON-RPC body.
    ///
    /// Used by the WebSocket transport, where there is no HTTP status to
    /// carry; the access check and chain resolution happened at upgrade time.
    pub async fn relay_rpc(
        &self,
        chain: &Arc<Chain>,
        request: &JsonRpcRequest,
    ) -> serde_json::Value {
        if let Err(e) = request.validate() {
            let body = JsonRpcResponse::error(
                error_codes::INVALID_REQUEST,
                e.to_string(),
                Arc::clone(&request.id),
            );
            return serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
        }
        let outcome = self.relayer.relay(chain, request).await;
        self.respond(chain, request, outcome).body
    }

    fn respond(
        &self,
        chain: &Arc<Chain>,
        request: &JsonRpcRequest,
        outcome: RelayOutcome,
    ) -> GatewayResponse {
        match outcome {
            RelayOutcome::Success { result, source } => {
                self.record_outcome(format!("success via {}", source.label()));
                let body = JsonRpcResponse::success(result, Arc::clone(&request.id));
                GatewayResponse {
                    status: 200,
                    body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
                }
            }
            RelayOutcome::LegalError { error, provider } => {
                self.record_outcome(format!("error response via {provider}"));
                let body = JsonRpcResponse::from_error(error, Arc::clone(&request.id));
                GatewayResponse {
                    status: 200,
                    body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
                }
            }
            RelayOutcome::AllFailed { failures } if failures.is_empty() => {
                self.record_outcome("no endpoint resolved".to_string());
                let err = GatewayError::NoConfiguredProvider(chain.chain_id);
                GatewayResponse::rpc_error(
                    err.http_status(),
                    err.rpc_code(),
                    err.to_string(),
                    Arc::clone(&request.id),
                )
            }
            RelayOutcome::AllFailed { failures } => {
                self.record_outcome(format!("all {} attempts failed", failures.len()));
                let attempts: Vec<serde_json::Value> = failures
                    .iter()
                    .map(|attempt| {
                        serde_json::json!({
                            "provider": attempt.provider.as_ref(),
                            "kind": attempt.failure.kind(),
                            "message": attempt.failure.to_string(),
                        })
                    })
                    .collect();
                // The status reflects the last failure: a dead upstream is a
                // 504, everything else a 502.
                let last = &failures[failures.len() - 1].failure;
                let status = match last {
                    RelayFailure::InternalFetchError { .. } => 504,
                    _ => 502,
                };
                let mut body = JsonRpcResponse::error(
                    error_codes::ALL_PROVIDERS_FAILED,
                    format!("all {} relay attempts failed: {last}", failures.len()),
                    Arc::clone(&request.id),
                );
                if let Some(error) = body.error.as_mut() {
                    error.data = Some(serde_json::Value::Array(attempts));
                }
                GatewayResponse {
                    status,
                    body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
                }
            }
        }
    }

    /// Handles a GET status request.
    #[must_use]
    pub fn handle_get(&self, path: &str, supplied_key: Option<&str>) -> GatewayResponse {
        let access = self.access_level(supplied_key);
        let chain = self.resolve_chain(path);

        let chain_block = match &chain {
            Ok(chain) => serde_json::json!({
                "chainId": chain.chain_id,
                "network": chain.network,
                "chain": chain.name,
                "blockTime": chain.block_time,
                "deprecated": chain.is_deprecated,
                "enabled": chain.is_enabled,
                "providersConfigured": self.check_providers(chain).is_ok(),
            }),
            Err(err) => serde_json::json!({ "error": err.to_string() }),
        };

        let status = match &chain {
            Ok(_) => 200,
            Err(err) => err.http_status(),
        };

        GatewayResponse {
            status,
            body: serde_json::json!({
                "access": access.as_str(),
                "chain": chain_block,
                "lastRelayOutcome": self.last_outcome.read().clone(),
                "time": chrono::Utc::now().to_rfc3339(),
            }),
        }
    }

    fn record_outcome(&self, outcome: String) {
        *self.last_outcome.write() = Some(outcome);
    }
}

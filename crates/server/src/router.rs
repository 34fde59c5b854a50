//! HTTP routing.
//!
//! Chain routes are parsed from the tail of the path, so the whole router is
//! a single fallback handler rather than a fixed route table. GET serves
//! status, POST relays, and a WebSocket upgrade on any chain path opens a
//! subscription session.

use axum::{
    extract::{ws::WebSocketUpgrade, OriginalUri, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use bytes::Bytes;
use nexus_core::{context::GatewayResponse, RelayHandler, SubscriptionHub};
use std::sync::Arc;

use crate::ws;

/// Shared server state.
pub struct AppState {
    pub handler: Arc<RelayHandler>,
    pub hub: Arc<SubscriptionHub>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new().fallback(gateway).with_state(state)
}

/// Single entry point for every path the gateway serves.
async fn gateway(
    State(state): State<Arc<AppState>>,
    ws: Option<WebSocketUpgrade>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let key = query_param(uri.query(), "key");

    if let Some(upgrade) = ws {
        return handle_upgrade(state, upgrade, &path, key.as_deref());
    }

    match method {
        Method::GET => to_response(state.handler.handle_get(&path, key.as_deref())),
        Method::POST => to_response(state.handler.handle_post(&path, key.as_deref(), &body).await),
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({"error": "method not allowed"})),
        )
            .into_response(),
    }
}

/// Authorizes and resolves the chain before accepting the upgrade, so a bad
/// request is rejected with a status code instead of a doomed socket.
fn handle_upgrade(
    state: Arc<AppState>,
    upgrade: WebSocketUpgrade,
    path: &str,
    key: Option<&str>,
) -> Response {
    if !state.handler.access_level(key).allows_relay() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "access denied"})),
        )
            .into_response();
    }
    let chain = match state.handler.resolve_chain(path) {
        Ok(chain) => chain,
        Err(err) => {
            let status = StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(serde_json::json!({"error": err.to_string()}))).into_response();
        }
    };

    tracing::debug!(chain_id = chain.chain_id, "accepting WebSocket session");
    upgrade.on_upgrade(move |socket| ws::serve(state, chain, socket))
}

fn to_response(reply: GatewayResponse) -> Response {
    let status =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(param, _)| param == name)
        .map(|(_, value)| value.into_owned())
}

//! Mock HTTP JSON-RPC node built on mockito.
//!
//! Each instance is one upstream provider. Expectations are plain mockito
//! mocks so tests can assert exact hit counts per provider.

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

/// One mock upstream node.
pub struct RpcNodeMock {
    server: ServerGuard,
}

impl RpcNodeMock {
    pub async fn start() -> Self {
        Self { server: mockito::Server::new_async().await }
    }

    /// HTTP URL of the node, usable as a `ChainSupport::Url` endpoint.
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Responds to `method` with a successful result, `hits` times.
    pub async fn mock_result(
        &mut self,
        method: &str,
        result: serde_json::Value,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": method })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Responds to `method` with a JSON-RPC error object (HTTP 200).
    pub async fn mock_rpc_error(
        &mut self,
        method: &str,
        code: i64,
        message: &str,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": method })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": code, "message": message },
                })
                .to_string(),
            )
            .expect(hits)
            .create_async()
            .await
    }

    /// Responds to any POST with an HTTP error status.
    pub async fn mock_http_error(&mut self, status: usize, hits: usize) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(status)
            .with_body("upstream exploded")
            .expect(hits)
            .create_async()
            .await
    }

    /// Responds with a 200 whose body is not JSON.
    pub async fn mock_garbage(&mut self, hits: usize) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>maintenance</html>")
            .expect(hits)
            .create_async()
            .await
    }

    /// A mock that must never be hit.
    pub async fn mock_untouched(&mut self) -> Mock {
        self.server.mock("POST", "/").expect(0).create_async().await
    }
}

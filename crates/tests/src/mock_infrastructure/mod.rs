//! Mock upstream infrastructure: HTTP JSON-RPC nodes backed by mockito and
//! a minimal WebSocket node speaking the `eth_subscribe` protocol.

pub mod rpc_mock;
pub mod ws_mock;

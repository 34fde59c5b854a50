//! HTTP/WebSocket surface of the Nexus gateway.
//!
//! Exposed as a library so integration tests can build the router against
//! in-process mock nodes; the `nexus` binary wires it to real configuration.

pub mod router;
pub mod ws;

//! Cluster Network Protocol
//!
//! Commands travel as a JSON `CommandEnvelope` posted to the command endpoint;
//! the reply body is a JSON `Response`.

/// Internal endpoint receiving commands from other nodes.
pub const ENDPOINT_COMMAND: &str = "/internal/command";

//! Storage HTTP Protocol
//!
//! Public endpoints for loading and reading cache entries. Node-to-node
//! traffic does not use these; it goes through the command endpoint.

use serde::{Deserialize, Serialize};

/// Public endpoint for client write requests (`/cache/:name`).
pub const ENDPOINT_CACHE: &str = "/cache";

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    /// `None` when the key does not exist.
    pub value: Option<serde_json::Value>,
}

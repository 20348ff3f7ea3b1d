use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Network identity of a cluster member.
///
/// For the HTTP transport this is the `host:port` the node's command endpoint
/// listens on; the simulated cluster uses symbolic names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options applied to every remote invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcOptions {
    /// Upper bound on how long a remote call may take.
    pub timeout: Duration,
}

impl RpcOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

/// Reply produced by a node for a single command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum Response {
    /// The command ran and produced a payload.
    Success(serde_json::Value),
    /// The command failed on the remote side.
    Exception(String),
}

impl Response {
    pub fn is_successful(&self) -> bool {
        matches!(self, Response::Success(_))
    }
}

/// Extracts the payload of a single-node response map.
///
/// Anything other than exactly one successful entry is an error for the
/// invoking part: an exception payload becomes `GridError::Remote`, an empty
/// or multi-entry map becomes `GridError::InvalidResponse`.
pub fn unwrap_single_response(responses: HashMap<Address, Response>) -> Result<serde_json::Value> {
    if responses.len() != 1 {
        return Err(GridError::InvalidResponse(format!(
            "expected a single response, got {}",
            responses.len()
        )));
    }

    match responses.into_iter().next() {
        Some((_, Response::Success(value))) => Ok(value),
        Some((address, Response::Exception(message))) => {
            Err(GridError::Remote { address, message })
        }
        None => Err(GridError::InvalidResponse("execution returned no value".to_string())),
    }
}

//! Error Types
//!
//! `GridError` is the single failure type surfaced by the MapReduce engine.
//! Precondition failures (configuration, authorization, cache state) are
//! returned as-is; anything that goes wrong once distributed work has started
//! is wrapped into `GridError::Task`, which keeps the original cause.

use crate::cluster::types::Address;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a `Transport` while delivering a command.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    #[error("no response from {address} within {timeout:?}")]
    Timeout { address: Address, timeout: Duration },

    #[error("node {address} is unreachable: {message}")]
    Unreachable { address: Address, message: String },

    #[error("node {0} is not a cluster member")]
    NoSuchNode(Address),
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("permission {permission} denied: {reason}")]
    Authorization { permission: String, reason: String },

    #[error("invalid cache state: {0}")]
    InvalidCacheState(String),

    #[error("cache {0} does not exist")]
    NoSuchCache(String),

    #[error("{phase} phase executing at {address} did not complete within {timeout:?} timeout")]
    PhaseTimeout {
        phase: &'static str,
        address: Address,
        timeout: Duration,
        #[source]
        source: RpcError,
    },

    #[error("execution failed at {address}: {message}")]
    Remote { address: Address, message: String },

    #[error("could not initialize intermediate cache {cache}: {reason}")]
    Provisioning { cache: String, reason: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("task part {0} was cancelled")]
    Cancelled(String),

    #[error("MapReduce task already cancelled")]
    TaskCancelled,

    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("malformed key {key}: {reason}")]
    MalformedKey { key: String, reason: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("worker failure: {0}")]
    Worker(String),

    #[error("MapReduce task {task_id} failed: {source}")]
    Task {
        task_id: String,
        #[source]
        source: Box<GridError>,
    },
}

impl GridError {
    /// Wraps an execution failure into the task-level error.
    /// Already wrapped errors are returned unchanged.
    pub fn for_task(task_id: &str, source: GridError) -> Self {
        match source {
            GridError::Task { .. } => source,
            other => GridError::Task {
                task_id: task_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// True when this error, or the cause it wraps, is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            GridError::PhaseTimeout { .. } => true,
            GridError::Rpc(RpcError::Timeout { .. }) => true,
            GridError::Task { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// The innermost error for diagnostics.
    pub fn root_cause(&self) -> &GridError {
        match self {
            GridError::Task { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GridError>;

//! Cluster Transport Abstraction
//!
//! The MapReduce engine never talks to the network directly. It goes through
//! a `Transport`, which knows the current member list, the local address and
//! how to deliver a `CommandEnvelope` to one node.

use super::types::{Address, Response, RpcOptions};
use crate::commands::CommandEnvelope;
use crate::error::RpcError;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Address of the node owning this transport.
    fn local_address(&self) -> Address;

    /// Current cluster members, local node included.
    fn members(&self) -> Vec<Address>;

    /// Delivers one command to one node and waits for its reply,
    /// bounded by `options.timeout`.
    async fn invoke(
        &self,
        target: &Address,
        command: CommandEnvelope,
        options: &RpcOptions,
    ) -> Result<Response, RpcError>;
}

/// Sends `command` to every target except the local node and waits for all
/// replies. The first transport failure is returned.
pub async fn invoke_remotely(
    transport: &dyn Transport,
    targets: &[Address],
    command: &CommandEnvelope,
    options: &RpcOptions,
) -> Result<HashMap<Address, Response>, RpcError> {
    let local = transport.local_address();
    let calls = targets
        .iter()
        .filter(|target| **target != local)
        .map(|target| async move {
            let response = transport.invoke(target, command.clone(), options).await;
            (target.clone(), response)
        });

    let mut responses = HashMap::new();
    for (target, response) in join_all(calls).await {
        responses.insert(target, response?);
    }
    Ok(responses)
}

/// Starts a single-target invocation in the background. The handle resolves
/// to a one-entry map from the target to its response.
pub fn invoke_remotely_in_future(
    transport: Arc<dyn Transport>,
    target: Address,
    command: CommandEnvelope,
    options: RpcOptions,
) -> JoinHandle<Result<HashMap<Address, Response>, RpcError>> {
    tokio::spawn(async move {
        tracing::debug!("Invoking {} on {}", command.tag, target);
        let response = transport.invoke(&target, command, &options).await?;
        Ok(HashMap::from([(target, response)]))
    })
}

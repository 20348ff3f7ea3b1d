//! In-Process Simulated Cluster
//!
//! Runs several `GridNode`s inside one process. Commands still go through a
//! `Transport` and are JSON encoded on the way in and out, so the code paths
//! match the HTTP deployment. Individual nodes can be slowed down or
//! suspended to exercise timeouts.

use super::transport::Transport;
use super::types::{Address, Response, RpcOptions};
use crate::commands::CommandEnvelope;
use crate::commands::registry::CommandRegistry;
use crate::config::NodeSettings;
use crate::error::RpcError;
use crate::node::GridNode;
use crate::storage::cache::CacheConfiguration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shared routing table of the simulated cluster.
#[derive(Default)]
pub struct SimulatedHub {
    members: Vec<Address>,
    registries: DashMap<Address, Weak<CommandRegistry>>,
    latency: DashMap<Address, Duration>,
    suspended: DashSet<Address>,
}

impl SimulatedHub {
    fn new(members: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            members,
            ..Default::default()
        })
    }

    fn attach(&self, address: Address, registry: &Arc<CommandRegistry>) {
        self.registries.insert(address, Arc::downgrade(registry));
    }

    async fn deliver(&self, target: &Address, command: CommandEnvelope) -> Result<Response, RpcError> {
        let latency = self.latency.get(target).map(|d| *d);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        if self.suspended.contains(target) {
            tracing::debug!("Node {} is suspended, dropping {}", target, command.tag);
            std::future::pending::<()>().await;
        }

        let registry = self
            .registries
            .get(target)
            .and_then(|entry| entry.upgrade())
            .ok_or_else(|| RpcError::Unreachable {
                address: target.clone(),
                message: "node has shut down".to_string(),
            })?;

        // Emulate the wire: the receiving node only ever sees decoded JSON.
        let encoded = serde_json::to_vec(&command).map_err(|e| wire_error(target, e))?;
        let decoded: CommandEnvelope =
            serde_json::from_slice(&encoded).map_err(|e| wire_error(target, e))?;

        let response = registry.dispatch(decoded).await;

        let encoded = serde_json::to_vec(&response).map_err(|e| wire_error(target, e))?;
        serde_json::from_slice(&encoded).map_err(|e| wire_error(target, e))
    }
}

fn wire_error(address: &Address, error: serde_json::Error) -> RpcError {
    RpcError::Unreachable {
        address: address.clone(),
        message: format!("wire encoding failed: {error}"),
    }
}

/// Transport handed to each simulated node.
pub struct SimulatedTransport {
    local: Address,
    hub: Arc<SimulatedHub>,
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn local_address(&self) -> Address {
        self.local.clone()
    }

    fn members(&self) -> Vec<Address> {
        self.hub.members.clone()
    }

    async fn invoke(
        &self,
        target: &Address,
        command: CommandEnvelope,
        options: &RpcOptions,
    ) -> Result<Response, RpcError> {
        if !self.hub.members.contains(target) {
            return Err(RpcError::NoSuchNode(target.clone()));
        }

        match tokio::time::timeout(options.timeout, self.hub.deliver(target, command)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                address: target.clone(),
                timeout: options.timeout,
            }),
        }
    }
}

/// A set of nodes wired together through a `SimulatedHub`.
pub struct SimulatedCluster {
    hub: Arc<SimulatedHub>,
    nodes: Vec<Arc<GridNode>>,
}

impl SimulatedCluster {
    /// Starts `size` nodes named `node-0` .. `node-{size-1}`.
    pub fn start(size: usize, settings: NodeSettings) -> Self {
        let addresses: Vec<Address> = (0..size)
            .map(|i| Address::new(format!("node-{i}")))
            .collect();
        let hub = SimulatedHub::new(addresses.clone());

        let nodes = addresses
            .into_iter()
            .map(|address| {
                let transport = Arc::new(SimulatedTransport {
                    local: address.clone(),
                    hub: hub.clone(),
                });
                let node = GridNode::clustered(transport, settings.clone());
                hub.attach(address, &node.commands);
                node
            })
            .collect();

        tracing::info!("Simulated cluster started with {} nodes", size);
        Self { hub, nodes }
    }

    pub fn nodes(&self) -> &[Arc<GridNode>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Arc<GridNode> {
        &self.nodes[index]
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.hub.members.clone()
    }

    /// Defines and starts the same cache on every node.
    pub fn define_cache(&self, name: &str, configuration: CacheConfiguration) {
        for node in &self.nodes {
            node.caches.define_configuration(name, configuration.clone());
            node.caches.get_or_create_cache(name);
        }
    }

    /// Adds a fixed delay before the node processes any command.
    pub fn set_latency(&self, address: &Address, latency: Duration) {
        self.hub.latency.insert(address.clone(), latency);
    }

    /// The node keeps its state but stops answering commands.
    pub fn suspend(&self, address: &Address) {
        self.hub.suspended.insert(address.clone());
    }

    pub fn resume(&self, address: &Address) {
        self.hub.suspended.remove(address);
    }
}

//! Grid Node
//!
//! Wires the per-node services together and registers the handlers for
//! every command a peer may send.
//!
//! ## Components
//! - **`caches`**: named caches and their configurations.
//! - **`partitioner`**: key to owner placement.
//! - **`functions`**: mapper/reducer implementations known to this node.
//! - **`cancellation`**: tokens of the task parts running here.
//! - **`mapreduce`**: executes map-combine and reduce parts.
//! - **`commands`**: tag to handler table used by the transport endpoints.

use crate::cluster::transport::Transport;
use crate::cluster::types::{Address, RpcOptions};
use crate::commands::registry::CommandRegistry;
use crate::commands::types::*;
use crate::config::NodeSettings;
use crate::error::GridError;
use crate::mapreduce::cancellation::CancellationService;
use crate::mapreduce::functions::FunctionRegistry;
use crate::mapreduce::lifecycle::TaskLifecycleService;
use crate::mapreduce::manager::MapReduceManager;
use crate::storage::manager::CacheManager;
use crate::storage::partitioner::PartitionManager;

use serde_json::Value;
use std::sync::Arc;

/// Address used by a node running without a cluster.
pub const LOCAL_ADDRESS: &str = "local";

pub struct GridNode {
    address: Address,
    transport: Option<Arc<dyn Transport>>,
    settings: NodeSettings,
    pub partitioner: Arc<PartitionManager>,
    pub caches: Arc<CacheManager>,
    pub cancellation: Arc<CancellationService>,
    pub functions: Arc<FunctionRegistry>,
    pub lifecycle: Arc<TaskLifecycleService>,
    pub commands: Arc<CommandRegistry>,
    pub mapreduce: Arc<MapReduceManager>,
}

impl GridNode {
    /// A standalone node: every cache is local and tasks never leave it.
    pub fn local(settings: NodeSettings) -> Arc<Self> {
        Self::build(Address::new(LOCAL_ADDRESS), None, settings)
    }

    pub fn clustered(transport: Arc<dyn Transport>, settings: NodeSettings) -> Arc<Self> {
        let address = transport.local_address();
        Self::build(address, Some(transport), settings)
    }

    fn build(
        address: Address,
        transport: Option<Arc<dyn Transport>>,
        settings: NodeSettings,
    ) -> Arc<Self> {
        let rpc_options = RpcOptions::with_timeout(settings.rpc_timeout);
        let partitioner = Arc::new(PartitionManager::new(
            settings.num_partitions,
            address.clone(),
            transport.clone(),
        ));
        let caches = CacheManager::new(
            partitioner.clone(),
            transport.clone(),
            rpc_options,
            settings.num_owners,
        );
        let cancellation = CancellationService::new();
        let functions = FunctionRegistry::new();
        let lifecycle = TaskLifecycleService::new();
        let mapreduce = MapReduceManager::new(
            caches.clone(),
            cancellation.clone(),
            functions.clone(),
            lifecycle.clone(),
            settings.worker_count,
        );

        let node = Arc::new(Self {
            address,
            transport,
            settings,
            partitioner,
            caches,
            cancellation,
            functions,
            lifecycle,
            commands: CommandRegistry::new(),
            mapreduce,
        });
        node.register_commands();

        tracing::info!(
            "Node {} ready ({} workers, {} commands)",
            node.address,
            node.settings.worker_count,
            node.commands.command_count()
        );
        node
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub fn is_clustered(&self) -> bool {
        self.transport.is_some()
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn rpc_options(&self) -> RpcOptions {
        RpcOptions::with_timeout(self.settings.rpc_timeout)
    }

    fn register_commands(&self) {
        let caches = self.caches.clone();
        self.commands.register(move |command: CreateCacheCommand| {
            let caches = caches.clone();
            async move {
                caches.create_cache(&command.cache_name, &command.configuration_name)?;
                Ok::<_, GridError>(Value::Null)
            }
        });

        let caches = self.caches.clone();
        self.commands.register(move |command: RemoveCacheCommand| {
            let caches = caches.clone();
            async move { Ok::<_, GridError>(Value::Bool(caches.remove_cache(&command.cache_name))) }
        });

        let caches = self.caches.clone();
        self.commands.register(move |command: PutEntryCommand| {
            let caches = caches.clone();
            async move {
                caches
                    .get_or_create_cache(&command.cache_name)
                    .apply_put(command.key, command.value);
                Ok::<_, GridError>(Value::Null)
            }
        });

        let caches = self.caches.clone();
        self.commands.register(move |command: AppendEntriesCommand| {
            let caches = caches.clone();
            async move {
                let cache = caches
                    .get_cache(&command.cache_name)
                    .ok_or_else(|| GridError::NoSuchCache(command.cache_name.clone()))?;
                cache.apply_append(command.entries);
                Ok::<_, GridError>(Value::Null)
            }
        });

        let caches = self.caches.clone();
        self.commands.register(move |command: GetEntryCommand| {
            let caches = caches.clone();
            async move {
                let value = caches
                    .get_cache(&command.cache_name)
                    .and_then(|cache| cache.get_local_raw(&command.key));
                Ok::<_, GridError>(serde_json::to_value(value)?)
            }
        });

        let caches = self.caches.clone();
        self.commands.register(move |command: RemoveEntriesCommand| {
            let caches = caches.clone();
            async move {
                if let Some(cache) = caches.get_cache(&command.cache_name) {
                    cache.apply_remove(&command.keys);
                }
                Ok::<_, GridError>(Value::Null)
            }
        });

        let mapreduce = self.mapreduce.clone();
        self.commands.register(move |command: MapCombineCommand| {
            let mapreduce = mapreduce.clone();
            async move {
                let job = mapreduce.resolve_map_combine(command)?;
                let output = mapreduce.map_and_combine(job).await?;
                Ok::<_, GridError>(serde_json::to_value(output)?)
            }
        });

        let mapreduce = self.mapreduce.clone();
        self.commands.register(move |command: ReduceCommand| {
            let mapreduce = mapreduce.clone();
            async move {
                let job = mapreduce.resolve_reduce(command)?;
                let reduced = mapreduce.reduce(job).await?;
                Ok::<_, GridError>(serde_json::to_value(reduced)?)
            }
        });

        let cancellation = self.cancellation.clone();
        self.commands.register(move |command: CancelCommand| {
            let cancellation = cancellation.clone();
            async move { Ok::<_, GridError>(Value::Bool(cancellation.cancel(&command.part_id))) }
        });
    }
}

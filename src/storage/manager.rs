use super::cache::{Cache, CacheConfiguration, GridCache};
use super::partitioner::PartitionManager;
use crate::cluster::transport::{Transport, invoke_remotely};
use crate::cluster::types::{Address, RpcOptions};
use crate::commands::ReplicableCommand;
use crate::commands::factory::CommandsFactory;
use crate::error::{GridError, Result};
use crate::mapreduce::types::{GridKey, GridValue};

use dashmap::DashMap;
use std::sync::Arc;

/// Configuration used for caches without a configuration of their own.
pub const DEFAULT_CONFIGURATION_NAME: &str = "default";

/// Configuration used for per-task and shared intermediate caches.
pub const DEFAULT_TMP_CACHE_CONFIGURATION_NAME: &str = "__tmpMapReduce";

/// Owns the caches of one node and the named configurations they are
/// created from.
pub struct CacheManager {
    caches: DashMap<String, Arc<GridCache>>,
    configurations: DashMap<String, CacheConfiguration>,
    partitioner: Arc<PartitionManager>,
    transport: Option<Arc<dyn Transport>>,
    rpc_options: RpcOptions,
}

impl CacheManager {
    /// Creates the manager with its two default configurations.
    ///
    /// # Arguments
    /// * `partitioner` - Decides the owners of every key.
    /// * `transport` - `None` for a standalone node; caches default to local mode.
    /// * `rpc_options` - Timeout for cache traffic to other members.
    /// * `num_owners` - Copies per entry in the default distributed configuration.
    pub fn new(
        partitioner: Arc<PartitionManager>,
        transport: Option<Arc<dyn Transport>>,
        rpc_options: RpcOptions,
        num_owners: usize,
    ) -> Arc<Self> {
        let default_configuration = if transport.is_some() {
            CacheConfiguration::distributed(num_owners)
        } else {
            CacheConfiguration::local()
        };

        let configurations = DashMap::new();
        configurations.insert(
            DEFAULT_CONFIGURATION_NAME.to_string(),
            default_configuration.clone(),
        );
        configurations.insert(
            DEFAULT_TMP_CACHE_CONFIGURATION_NAME.to_string(),
            default_configuration,
        );

        Arc::new(Self {
            caches: DashMap::new(),
            configurations,
            partitioner,
            transport,
            rpc_options,
        })
    }

    pub fn is_clustered(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub fn rpc_options(&self) -> &RpcOptions {
        &self.rpc_options
    }

    pub fn local_address(&self) -> Address {
        self.partitioner.local_address().clone()
    }

    /// Registers (or replaces) a named configuration. Caches created
    /// under the same name pick it up.
    pub fn define_configuration(&self, name: &str, configuration: CacheConfiguration) {
        tracing::debug!("Defined cache configuration {} ({})", name, configuration.mode);
        self.configurations.insert(name.to_string(), configuration);
    }

    pub fn configuration(&self, name: &str) -> Option<CacheConfiguration> {
        self.configurations.get(name).map(|entry| entry.value().clone())
    }

    /// Returns the named cache, starting it from its own configuration
    /// (or the default one) when it does not exist yet.
    pub fn get_or_create_cache(&self, name: &str) -> Arc<GridCache> {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| {
                let configuration = self
                    .configuration(name)
                    .or_else(|| self.configuration(DEFAULT_CONFIGURATION_NAME))
                    .unwrap_or_else(CacheConfiguration::local);
                tracing::info!("Starting cache {} ({})", name, configuration.mode);
                self.build_cache(name, configuration)
            })
            .clone()
    }

    /// Starts `name` from the configuration `configuration_name`.
    /// An already running cache is returned as is.
    ///
    /// # Returns
    /// * `Err(Configuration)` if no configuration has that name.
    pub fn create_cache(&self, name: &str, configuration_name: &str) -> Result<Arc<GridCache>> {
        if let Some(existing) = self.get_cache(name) {
            return Ok(existing);
        }

        let configuration = self.configuration(configuration_name).ok_or_else(|| {
            GridError::Configuration(format!(
                "no cache configuration named {configuration_name}"
            ))
        })?;

        let cache = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    "Starting cache {} from configuration {}",
                    name,
                    configuration_name
                );
                self.build_cache(name, configuration)
            })
            .clone();
        Ok(cache)
    }

    pub fn get_cache(&self, name: &str) -> Option<Arc<GridCache>> {
        self.caches.get(name).map(|entry| entry.value().clone())
    }

    /// Typed view over `get_or_create_cache(name)`.
    pub fn cache<K: GridKey, V: GridValue>(&self, name: &str) -> Cache<K, V> {
        Cache::new(self.get_or_create_cache(name))
    }

    pub fn cache_exists(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Stops and forgets the cache on this node only.
    pub fn remove_cache(&self, name: &str) -> bool {
        match self.caches.remove(name) {
            Some((_, cache)) => {
                cache.stop();
                tracing::info!("Removed cache {}", name);
                true
            }
            None => false,
        }
    }

    /// Removes the cache here and on every other member.
    ///
    /// Members that answer with an error are only logged; transport
    /// failures are returned.
    pub async fn remove_cache_cluster_wide(&self, name: &str) -> Result<()> {
        self.remove_cache(name);

        if let Some(transport) = &self.transport {
            let envelope = CommandsFactory::build_remove_cache_command(name).to_envelope()?;
            let members = transport.members();
            let responses =
                invoke_remotely(transport.as_ref(), &members, &envelope, &self.rpc_options).await?;
            for (address, response) in responses {
                if !response.is_successful() {
                    tracing::warn!("Cache {} could not be removed at {}", name, address);
                }
            }
        }
        Ok(())
    }

    fn build_cache(&self, name: &str, configuration: CacheConfiguration) -> Arc<GridCache> {
        GridCache::new(
            name,
            configuration,
            self.partitioner.clone(),
            self.transport.clone(),
            self.rpc_options.clone(),
        )
    }
}

//! Grid Caches
//!
//! A `GridCache` is one named key/value space. Depending on its mode the
//! entries live only on this node, on every node, or on `num_owners` nodes
//! chosen by the `PartitionManager`. Writes are sent straight to every owner;
//! reads prefer the local copy and otherwise ask the primary owner.

use super::memory::PartitionedStore;
use super::partitioner::PartitionManager;
use crate::cluster::transport::Transport;
use crate::cluster::types::{Address, RpcOptions, unwrap_single_response};
use crate::commands::ReplicableCommand;
use crate::commands::types::{
    AppendEntriesCommand, GetEntryCommand, PutEntryCommand, RemoveEntriesCommand,
};
use crate::error::{GridError, Result};
use crate::mapreduce::types::{GridKey, GridValue};
use crate::security::AuthorizationManager;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CacheMode {
    /// Entries never leave this node.
    Local,
    /// Every member holds every entry.
    Replicated,
    /// Each entry is held by `num_owners` members.
    Distributed,
    /// Entries are local; writes only invalidate peers. Not usable for MapReduce.
    Invalidation,
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheMode::Local => "local",
            CacheMode::Replicated => "replicated",
            CacheMode::Distributed => "distributed",
            CacheMode::Invalidation => "invalidation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfiguration {
    pub mode: CacheMode,
    pub num_owners: usize,
}

impl CacheConfiguration {
    pub fn local() -> Self {
        Self {
            mode: CacheMode::Local,
            num_owners: 1,
        }
    }

    pub fn distributed(num_owners: usize) -> Self {
        Self {
            mode: CacheMode::Distributed,
            num_owners: num_owners.max(1),
        }
    }

    pub fn replicated() -> Self {
        Self {
            mode: CacheMode::Replicated,
            num_owners: usize::MAX,
        }
    }

    pub fn invalidation() -> Self {
        Self {
            mode: CacheMode::Invalidation,
            num_owners: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Running,
    Stopping,
    Terminated,
}

impl CacheStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => CacheStatus::Running,
            1 => CacheStatus::Stopping,
            _ => CacheStatus::Terminated,
        }
    }
}

pub struct GridCache {
    name: String,
    configuration: CacheConfiguration,
    status: AtomicU8,
    store: PartitionedStore,
    partitioner: Arc<PartitionManager>,
    transport: Option<Arc<dyn Transport>>,
    rpc_options: RpcOptions,
    authorization: RwLock<Option<Arc<dyn AuthorizationManager>>>,
}

impl GridCache {
    pub fn new(
        name: &str,
        configuration: CacheConfiguration,
        partitioner: Arc<PartitionManager>,
        transport: Option<Arc<dyn Transport>>,
        rpc_options: RpcOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            configuration,
            status: AtomicU8::new(0),
            store: PartitionedStore::new(),
            partitioner,
            transport,
            rpc_options,
            authorization: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configuration(&self) -> &CacheConfiguration {
        &self.configuration
    }

    pub fn mode(&self) -> CacheMode {
        self.configuration.mode
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn stop(&self) {
        self.status.store(1, Ordering::SeqCst);
        self.store.clear();
        self.status.store(2, Ordering::SeqCst);
    }

    pub fn set_authorization(&self, manager: Arc<dyn AuthorizationManager>) {
        *self
            .authorization
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(manager);
    }

    pub fn authorization(&self) -> Option<Arc<dyn AuthorizationManager>> {
        self.authorization
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn local_address(&self) -> Address {
        self.partitioner.local_address().clone()
    }

    /// True when no entry of this cache can live on another node.
    pub fn is_local_only(&self) -> bool {
        self.transport.is_none()
            || matches!(self.configuration.mode, CacheMode::Local | CacheMode::Invalidation)
    }

    pub fn owners(&self, key: &str) -> Vec<Address> {
        if self.is_local_only() {
            return vec![self.local_address()];
        }
        let partition = self.partitioner.get_partition(key);
        self.partitioner
            .get_owners(partition, self.configuration.num_owners)
    }

    pub fn primary_owner(&self, key: &str) -> Address {
        self.owners(key)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.local_address())
    }

    /// Groups items by the primary owner of their routing key.
    pub fn map_keys_to_nodes<T, F>(
        &self,
        items: impl IntoIterator<Item = T>,
        routing_key: F,
    ) -> BTreeMap<Address, Vec<T>>
    where
        F: Fn(&T) -> String,
    {
        let mut grouped: BTreeMap<Address, Vec<T>> = BTreeMap::new();
        for item in items {
            grouped
                .entry(self.primary_owner(&routing_key(&item)))
                .or_default()
                .push(item);
        }
        grouped
    }

    // ============================================================
    // Local operations (also the targets of routed commands)
    // ============================================================

    pub fn apply_put(&self, key: String, value: Value) {
        let partition = self.partitioner.get_partition(&key);
        self.store.store_local(partition, key, value);
    }

    pub fn apply_append(&self, entries: Vec<(String, Vec<Value>)>) {
        for (key, values) in entries {
            let partition = self.partitioner.get_partition(&key);
            self.store.append_local(partition, key, values);
        }
    }

    pub fn apply_remove(&self, keys: &[String]) {
        for key in keys {
            let partition = self.partitioner.get_partition(key);
            self.store.remove_local(partition, key);
        }
    }

    pub fn get_local_raw(&self, key: &str) -> Option<Value> {
        let partition = self.partitioner.get_partition(key);
        self.store.get_local(partition, key)
    }

    /// Entries this node is the primary owner of. Across the cluster these
    /// sets are disjoint and together cover the whole cache.
    pub fn local_primary_entries(&self) -> Vec<(String, Value)> {
        let local_only = self.is_local_only();
        self.store
            .partitions()
            .into_iter()
            .filter(|&partition| local_only || self.partitioner.is_primary(partition))
            .flat_map(|partition| self.store.dump_partition(partition))
            .collect()
    }

    /// Local copies of the given keys; absent keys are skipped.
    pub fn local_entries_for(&self, keys: &[String]) -> Vec<(String, Value)> {
        keys.iter()
            .filter_map(|key| self.get_local_raw(key).map(|value| (key.clone(), value)))
            .collect()
    }

    pub fn local_entry_count(&self) -> usize {
        self.store.local_entry_count()
    }

    // ============================================================
    // Routed operations
    // ============================================================

    pub async fn put_raw(&self, key: String, value: Value) -> Result<()> {
        for owner in self.owners(&key) {
            if owner == self.local_address() {
                self.apply_put(key.clone(), value.clone());
            } else {
                let command = PutEntryCommand {
                    cache_name: self.name.clone(),
                    key: key.clone(),
                    value: value.clone(),
                };
                self.send(&owner, &command).await?;
            }
        }
        Ok(())
    }

    /// Appends values under several keys, one command per remote owner.
    pub async fn append_raw(&self, entries: Vec<(String, Vec<Value>)>) -> Result<()> {
        let mut by_owner: BTreeMap<Address, Vec<(String, Vec<Value>)>> = BTreeMap::new();
        for (key, values) in entries {
            for owner in self.owners(&key) {
                by_owner
                    .entry(owner)
                    .or_default()
                    .push((key.clone(), values.clone()));
            }
        }

        for (owner, entries) in by_owner {
            if owner == self.local_address() {
                self.apply_append(entries);
            } else {
                let command = AppendEntriesCommand {
                    cache_name: self.name.clone(),
                    entries,
                };
                self.send(&owner, &command).await?;
            }
        }
        Ok(())
    }

    pub async fn remove_raw(&self, keys: Vec<String>) -> Result<()> {
        let mut by_owner: BTreeMap<Address, Vec<String>> = BTreeMap::new();
        for key in keys {
            for owner in self.owners(&key) {
                by_owner.entry(owner).or_default().push(key.clone());
            }
        }

        for (owner, keys) in by_owner {
            if owner == self.local_address() {
                self.apply_remove(&keys);
            } else {
                let command = RemoveEntriesCommand {
                    cache_name: self.name.clone(),
                    keys,
                };
                self.send(&owner, &command).await?;
            }
        }
        Ok(())
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.get_local_raw(key) {
            return Ok(Some(value));
        }

        let primary = self.primary_owner(key);
        if primary == self.local_address() {
            return Ok(None);
        }

        let command = GetEntryCommand {
            cache_name: self.name.clone(),
            key: key.to_string(),
        };
        let value = self.send(&primary, &command).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn send<C: ReplicableCommand>(&self, target: &Address, command: &C) -> Result<Value> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            GridError::Configuration(format!("cache {} has no transport", self.name))
        })?;
        let response = transport
            .invoke(target, command.to_envelope()?, &self.rpc_options)
            .await?;
        unwrap_single_response(HashMap::from([(target.clone(), response)]))
    }
}

/// Typed view over a `GridCache`.
pub struct Cache<K, V> {
    inner: Arc<GridCache>,
    _types: PhantomData<fn(K) -> V>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _types: PhantomData,
        }
    }
}

impl<K: GridKey, V: GridValue> Cache<K, V> {
    pub fn new(inner: Arc<GridCache>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn inner(&self) -> &Arc<GridCache> {
        &self.inner
    }

    pub async fn put(&self, key: K, value: V) -> Result<()> {
        self.inner
            .put_raw(key.to_string(), serde_json::to_value(value)?)
            .await
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        match self.inner.get_raw(&key.to_string()).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn get_local(&self, key: &K) -> Result<Option<V>> {
        match self.inner.get_local_raw(&key.to_string()) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

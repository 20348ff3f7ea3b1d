//! MapReduce Task Coordinator
//!
//! `MapReduceTask` runs on the invoking node and drives one task through the
//! cluster.
//!
//! ## Protocol
//! 1. **Preconditions**: execute permission, running cache in a usable mode,
//!    mapper and reducer set. Failures here are returned unwrapped.
//! 2. **Distributed reduce** (clustered and requested):
//!    provision the intermediate cache (locally, then on every member), fan
//!    out map parts that stage output in the intermediate cache, group the
//!    produced keys by intermediate owner and fan out reduce parts. A per-task
//!    intermediate cache is removed cluster-wide afterwards, even on failure.
//! 3. **Local reduce** (otherwise): map parts return grouped values, the
//!    coordinator merges them and reduces entry by entry.
//!
//! Parts of one phase run concurrently, but their results are collected in
//! dispatch order. Every failure after the preconditions is wrapped into
//! `GridError::Task`.

use super::functions::{MapFunction, MapperAdapter, ReduceFunction, ReducerAdapter};
use super::future::{TaskCanceller, TaskFuture};
use super::manager::{MapCombineJob, MapCombineOutput, ReduceJob};
use super::part::{PartWork, TaskPart};
use super::types::{
    Collator, GridKey, GridValue, Mapper, PartId, Reducer, TaskId, decode_key,
    intermediate_storage_key,
};
use crate::cluster::transport::{Transport, invoke_remotely};
use crate::cluster::types::{Address, Response, RpcOptions};
use crate::commands::ReplicableCommand;
use crate::commands::factory::{CommandsFactory, DEFAULT_MAX_COLLECTOR_SIZE};
use crate::error::{GridError, Result, RpcError};
use crate::node::GridNode;
use crate::security::Permission;
use crate::storage::cache::{CacheMode, CacheStatus, GridCache};
use crate::storage::manager::DEFAULT_TMP_CACHE_CONFIGURATION_NAME;

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Values buffered per map part before they are combined and flushed.
pub const MAX_COLLECTOR_SIZE: usize = DEFAULT_MAX_COLLECTOR_SIZE;

/// A dispatched part that a cancel request can still reach.
#[derive(Debug, Clone, PartialEq)]
pub struct CancellablePart {
    pub part_id: PartId,
    pub target: Address,
}

pub type CancellableParts = Arc<Mutex<Vec<CancellablePart>>>;

pub struct MapReduceTask<KIn, VIn, KOut, VOut> {
    node: Arc<GridNode>,
    cache: Arc<GridCache>,
    task_id: TaskId,
    mapper: Option<Arc<dyn MapFunction>>,
    reducer: Option<Arc<dyn ReduceFunction>>,
    combiner: Option<Arc<dyn ReduceFunction>>,
    keys: Vec<KIn>,
    distribute_reduce_phase: bool,
    use_intermediate_shared_cache: bool,
    is_local_only: bool,
    rpc_options: RpcOptions,
    custom_intermediate_cache_name: Option<String>,
    intermediate_cache_configuration_name: String,
    cancellable_parts: CancellableParts,
    _types: PhantomData<fn(VIn) -> (KOut, VOut)>,
}

impl<KIn, VIn, KOut, VOut> MapReduceTask<KIn, VIn, KOut, VOut>
where
    KIn: GridKey,
    VIn: GridValue,
    KOut: GridKey,
    VOut: GridValue,
{
    /// Task over `cache_name` reducing on this node.
    pub fn new(node: &Arc<GridNode>, cache_name: &str) -> Result<Self> {
        Self::with_options(node, cache_name, false, false)
    }

    /// Task with a chosen reduce placement, staging through the shared
    /// intermediate cache.
    pub fn with_distributed_reduce(
        node: &Arc<GridNode>,
        cache_name: &str,
        distribute_reduce_phase: bool,
    ) -> Result<Self> {
        Self::with_options(node, cache_name, distribute_reduce_phase, true)
    }

    /// Creates a task over an existing cache.
    ///
    /// # Arguments
    /// * `node` - The node that coordinates the task.
    /// * `cache_name` - Input cache; it must exist on `node` and be running.
    /// * `distribute_reduce_phase` - Reduce on the owners of the intermediate
    ///   keys instead of on `node`.
    /// * `use_intermediate_shared_cache` - Stage through the shared
    ///   intermediate cache instead of a per-task one.
    ///
    /// # Returns
    /// * `Err(Configuration)` for an empty cache name.
    /// * `Err(NoSuchCache)`, `Err(Authorization)` or `Err(InvalidCacheState)`
    ///   when the cache can not be used.
    pub fn with_options(
        node: &Arc<GridNode>,
        cache_name: &str,
        distribute_reduce_phase: bool,
        use_intermediate_shared_cache: bool,
    ) -> Result<Self> {
        if cache_name.is_empty() {
            return Err(GridError::Configuration("cache name can not be empty".into()));
        }
        let cache = node
            .caches
            .get_cache(cache_name)
            .ok_or_else(|| GridError::NoSuchCache(cache_name.to_string()))?;

        ensure_access_permissions(&cache)?;
        ensure_proper_cache_state(node, &cache)?;

        let task_id = TaskId::new();
        tracing::debug!("Created MapReduce task {} over cache {}", task_id, cache_name);

        Ok(Self {
            node: node.clone(),
            is_local_only: cache.is_local_only(),
            cache,
            task_id,
            mapper: None,
            reducer: None,
            combiner: None,
            keys: Vec::new(),
            distribute_reduce_phase,
            use_intermediate_shared_cache,
            rpc_options: node.rpc_options(),
            custom_intermediate_cache_name: None,
            intermediate_cache_configuration_name: DEFAULT_TMP_CACHE_CONFIGURATION_NAME.to_string(),
            cancellable_parts: Arc::new(Mutex::new(Vec::new())),
            _types: PhantomData,
        })
    }

    // ============================================================
    // Builder
    // ============================================================

    /// Restricts the task to the given input keys.
    pub fn on_keys(mut self, keys: impl IntoIterator<Item = KIn>) -> Self {
        self.keys.extend(keys);
        self
    }

    /// Sets the mapper. In-process parts map with a `clone()` of it.
    pub fn mapped_with<M>(mut self, mapper: M) -> Self
    where
        M: Mapper<KIn, VIn, KOut, VOut>,
    {
        self.mapper = Some(MapperAdapter::<M, KIn, VIn, KOut, VOut>::erase(mapper));
        self
    }

    /// Sets the reducer; required before execution.
    pub fn reduced_with<R>(mut self, reducer: R) -> Self
    where
        R: Reducer<KOut, VOut>,
    {
        self.reducer = Some(ReducerAdapter::<R, KOut, VOut>::erase(reducer));
        self
    }

    /// Optional combiner, applied to each part's output before it leaves
    /// the node and at every collector flush.
    pub fn combined_with<R>(mut self, combiner: R) -> Self
    where
        R: Reducer<KOut, VOut>,
    {
        self.combiner = Some(ReducerAdapter::<R, KOut, VOut>::erase(combiner));
        self
    }

    /// Bound on every remote call of the task. Zero waits forever.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() { Duration::MAX } else { timeout };
        self.rpc_options = RpcOptions::with_timeout(timeout);
        self
    }

    pub fn get_timeout(&self) -> Duration {
        self.rpc_options.timeout
    }

    /// Per-task intermediate cache created from `configuration_name`.
    pub fn using_intermediate_cache(mut self, configuration_name: &str) -> Result<Self> {
        if configuration_name.is_empty() {
            return Err(GridError::Configuration(
                "intermediate cache configuration name can not be empty".into(),
            ));
        }
        self.intermediate_cache_configuration_name = configuration_name.to_string();
        self.use_intermediate_shared_cache = false;
        Ok(self)
    }

    /// Shared intermediate cache `cache_name` with the default configuration.
    pub fn using_shared_intermediate_cache(self, cache_name: &str) -> Result<Self> {
        self.using_shared_intermediate_cache_with(cache_name, DEFAULT_TMP_CACHE_CONFIGURATION_NAME)
    }

    /// Shared intermediate cache `cache_name` created from
    /// `configuration_name`. Both names must be non-empty.
    pub fn using_shared_intermediate_cache_with(
        mut self,
        cache_name: &str,
        configuration_name: &str,
    ) -> Result<Self> {
        if cache_name.is_empty() {
            return Err(GridError::Configuration(
                "shared intermediate cache name can not be empty".into(),
            ));
        }
        if configuration_name.is_empty() {
            return Err(GridError::Configuration(
                "intermediate cache configuration name can not be empty".into(),
            ));
        }
        self.custom_intermediate_cache_name = Some(cache_name.to_string());
        self.intermediate_cache_configuration_name = configuration_name.to_string();
        self.use_intermediate_shared_cache = true;
        Ok(self)
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn is_local_only(&self) -> bool {
        self.is_local_only
    }

    /// Name of the intermediate cache: the shared one, or the task id.
    pub fn intermediate_cache_name(&self) -> String {
        if self.use_intermediate_shared_cache {
            self.custom_intermediate_cache_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TMP_CACHE_CONFIGURATION_NAME.to_string())
        } else {
            self.task_id.to_string()
        }
    }

    // ============================================================
    // Execution entry points
    // ============================================================

    /// Runs the task and returns the reduced map.
    ///
    /// # Returns
    /// * `Err(Configuration)` if the mapper or reducer was not set.
    /// * `Err(Task)` wrapping the first part failure or timeout.
    pub async fn execute(&self) -> Result<HashMap<KOut, VOut>> {
        self.execute_helper(None).await
    }

    /// Runs the task and stores the reduced entries in `results_cache`.
    pub async fn execute_into(&self, results_cache: &str) -> Result<()> {
        if results_cache.is_empty() {
            return Err(GridError::Configuration("results cache name can not be empty".into()));
        }
        self.execute_helper(Some(results_cache)).await.map(|_| ())
    }

    /// Runs the task and hands the reduced map to `collator`.
    pub async fn execute_collated<R, C>(&self, collator: &C) -> Result<R>
    where
        C: Collator<KOut, VOut, R>,
    {
        let reduced = self.execute().await?;
        Ok(collator.collate(reduced))
    }

    /// Defers execution until the returned future is awaited; the future can
    /// cancel whatever parts are in flight at that point.
    pub fn execute_asynchronously(self) -> TaskFuture<HashMap<KOut, VOut>> {
        let canceller = self.canceller();
        TaskFuture::new(canceller, async move { self.execute().await })
    }

    pub fn execute_asynchronously_collated<R, C>(self, collator: C) -> TaskFuture<R>
    where
        C: Collator<KOut, VOut, R> + 'static,
        R: Send + 'static,
    {
        let canceller = self.canceller();
        TaskFuture::new(canceller, async move {
            let reduced = self.execute().await?;
            Ok(collator.collate(reduced))
        })
    }

    fn canceller(&self) -> TaskCanceller {
        TaskCanceller::new(self.node.clone(), self.cancellable_parts.clone(), self.rpc_options.clone())
    }

    async fn execute_helper(&self, result_cache: Option<&str>) -> Result<HashMap<KOut, VOut>> {
        ensure_access_permissions(&self.cache)?;
        ensure_proper_cache_state(&self.node, &self.cache)?;

        let mapper = self.mapper.clone().ok_or_else(|| {
            GridError::Configuration("a mapper must be set before execution".into())
        })?;
        let reducer = self.reducer.clone().ok_or_else(|| {
            GridError::Configuration("a reducer must be set before execution".into())
        })?;

        tracing::info!("Executing {}", self);

        let outcome = if !self.is_local_only && self.distribute_reduce_phase {
            self.execute_distributed(result_cache, &mapper, &reducer).await
        } else {
            self.execute_with_local_reduce(result_cache, &mapper, &reducer).await
        };

        match outcome {
            Ok(reduced) => {
                tracing::info!("MapReduce task {} produced {} entries", self.task_id, reduced.len());
                Ok(reduced)
            }
            Err(e) => {
                tracing::error!("MapReduce task {} failed: {}", self.task_id, e);
                Err(GridError::for_task(&self.task_id.0, e))
            }
        }
    }

    // ============================================================
    // Distributed reduce
    // ============================================================

    async fn execute_distributed(
        &self,
        result_cache: Option<&str>,
        mapper: &Arc<dyn MapFunction>,
        reducer: &Arc<dyn ReduceFunction>,
    ) -> Result<HashMap<KOut, VOut>> {
        let intermediate_cache_name = self.intermediate_cache_name();
        let composite = self.use_intermediate_shared_cache;

        let outcome = async {
            self.execute_task_init(&intermediate_cache_name).await?;
            let output_keys = self.execute_map_phase(mapper, composite).await?;
            self.execute_reduce_phase(result_cache, reducer, output_keys, composite)
                .await
        }
        .await;

        if !self.use_intermediate_shared_cache {
            if let Err(e) = self
                .node
                .caches
                .remove_cache_cluster_wide(&intermediate_cache_name)
                .await
            {
                tracing::warn!(
                    "Could not remove intermediate cache {}: {}",
                    intermediate_cache_name,
                    e
                );
            }
        }
        outcome
    }

    /// Creates the intermediate cache here, then on every other member.
    async fn execute_task_init(&self, cache_name: &str) -> Result<()> {
        let transport = self.transport()?;
        let members = transport.members();
        let command = CommandsFactory::build_create_cache_command(
            cache_name,
            &self.intermediate_cache_configuration_name,
        );

        self.node
            .caches
            .create_cache(&command.cache_name, &command.configuration_name)
            .map_err(|e| GridError::Provisioning {
                cache: cache_name.to_string(),
                reason: e.to_string(),
            })?;

        let envelope = command.to_envelope()?;
        let responses = invoke_remotely(transport.as_ref(), &members, &envelope, &self.rpc_options)
            .await
            .map_err(|e| GridError::Provisioning {
                cache: cache_name.to_string(),
                reason: e.to_string(),
            })?;

        for (address, response) in responses {
            if let Response::Exception(message) = response {
                return Err(GridError::Provisioning {
                    cache: cache_name.to_string(),
                    reason: format!("{address} failed: {message}"),
                });
            }
        }
        Ok(())
    }

    async fn execute_map_phase(
        &self,
        mapper: &Arc<dyn MapFunction>,
        composite: bool,
    ) -> Result<BTreeSet<String>> {
        let outcome = async {
            let mut parts = Vec::new();
            for (target, keys) in self.map_targets() {
                let mut part = self.create_map_part(target, mapper, keys, true, composite)?;
                part.execute(&self.node, &self.rpc_options)?;
                parts.push(part);
            }

            let mut output_keys = BTreeSet::new();
            for part in parts {
                match serde_json::from_value::<MapCombineOutput>(self.await_part(part).await?)? {
                    MapCombineOutput::Keys(keys) => output_keys.extend(keys),
                    MapCombineOutput::Grouped(_) => {
                        return Err(GridError::InvalidResponse(
                            "map part returned values instead of intermediate keys".into(),
                        ));
                    }
                }
            }
            Ok::<_, GridError>(output_keys)
        }
        .await;

        self.clear_parts();
        outcome
    }

    async fn execute_reduce_phase(
        &self,
        result_cache: Option<&str>,
        reducer: &Arc<dyn ReduceFunction>,
        output_keys: BTreeSet<String>,
        composite: bool,
    ) -> Result<HashMap<KOut, VOut>> {
        let intermediate_cache_name = self.intermediate_cache_name();
        let intermediate = self
            .node
            .caches
            .get_cache(&intermediate_cache_name)
            .ok_or_else(|| GridError::NoSuchCache(intermediate_cache_name.clone()))?;

        let keys_to_nodes = intermediate.map_keys_to_nodes(output_keys, |key| {
            intermediate_storage_key(&self.task_id, key, composite)
        });

        let outcome = async {
            let mut parts = Vec::with_capacity(keys_to_nodes.len());
            for (target, keys) in keys_to_nodes {
                let reducer = self.isolate_reducer(&target, reducer);
                let command = CommandsFactory::build_reduce_command(
                    &self.task_id,
                    &intermediate_cache_name,
                    reducer.as_ref(),
                    keys,
                )?
                .with_composite_intermediate_keys(composite)
                .with_result_cache_name(result_cache.map(str::to_string));

                self.register_part(&command.part_id, &target);
                let mut part = TaskPart::new(target, PartWork::Reduce(ReduceJob { command, reducer }));
                part.execute(&self.node, &self.rpc_options)?;
                parts.push(part);
            }

            let mut reduced = HashMap::new();
            for part in parts {
                let partial: Vec<(String, Value)> =
                    serde_json::from_value(self.await_part(part).await?)?;
                for (key, value) in partial {
                    reduced.insert(decode_key::<KOut>(&key)?, serde_json::from_value::<VOut>(value)?);
                }
            }
            Ok::<_, GridError>(reduced)
        }
        .await;

        self.clear_parts();
        outcome
    }

    // ============================================================
    // Local reduce
    // ============================================================

    async fn execute_with_local_reduce(
        &self,
        result_cache: Option<&str>,
        mapper: &Arc<dyn MapFunction>,
        reducer: &Arc<dyn ReduceFunction>,
    ) -> Result<HashMap<KOut, VOut>> {
        let merged = Mutex::new(HashMap::new());
        self.execute_map_phase_with_local_reduction(mapper, &merged)
            .await?;
        let grouped = merged
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let reduced = self.reduce_locally(&reducer.duplicate(), grouped)?;

        match result_cache {
            None => Ok(reduced),
            Some(name) => {
                let results = self.node.caches.get_or_create_cache(name);
                for (key, value) in reduced {
                    results
                        .put_raw(key.to_string(), serde_json::to_value(value)?)
                        .await?;
                }
                Ok(HashMap::new())
            }
        }
    }

    async fn execute_map_phase_with_local_reduction(
        &self,
        mapper: &Arc<dyn MapFunction>,
        merged: &Mutex<HashMap<String, Vec<Value>>>,
    ) -> Result<()> {
        let outcome = async {
            let mut parts = Vec::new();
            for (target, keys) in self.map_targets() {
                let mut part = self.create_map_part(target, mapper, keys, false, false)?;
                part.execute(&self.node, &self.rpc_options)?;
                parts.push(part);
            }

            for part in parts {
                match serde_json::from_value::<MapCombineOutput>(self.await_part(part).await?)? {
                    MapCombineOutput::Grouped(partial) => merge_response(merged, partial),
                    MapCombineOutput::Keys(_) => {
                        return Err(GridError::InvalidResponse(
                            "map part returned intermediate keys instead of values".into(),
                        ));
                    }
                }
            }
            Ok::<_, GridError>(())
        }
        .await;

        self.clear_parts();
        outcome
    }

    fn reduce_locally(
        &self,
        reducer: &Arc<dyn ReduceFunction>,
        grouped: HashMap<String, Vec<Value>>,
    ) -> Result<HashMap<KOut, VOut>> {
        let lifecycle = &self.node.lifecycle;
        lifecycle.on_pre_execute(reducer.name(), self.cache.name());
        let reduced = reduce_entries(reducer.as_ref(), grouped);
        lifecycle.on_post_execute(reducer.name());
        reduced
    }

    // ============================================================
    // Parts
    // ============================================================

    /// Map targets with their key subsets. Without explicit keys every
    /// member maps its whole share of the cache.
    fn map_targets(&self) -> Vec<(Address, Option<Vec<String>>)> {
        if self.keys.is_empty() {
            let members = if self.is_local_only {
                vec![self.node.address().clone()]
            } else {
                self.node.partitioner.members()
            };
            return members.into_iter().map(|member| (member, None)).collect();
        }

        let mut seen = HashSet::new();
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|key| key.to_string())
            .filter(|key| seen.insert(key.clone()))
            .collect();

        self.cache
            .map_keys_to_nodes(keys, |key| key.clone())
            .into_iter()
            .map(|(target, keys)| (target, Some(keys)))
            .collect()
    }

    fn create_map_part(
        &self,
        target: Address,
        mapper: &Arc<dyn MapFunction>,
        keys: Option<Vec<String>>,
        reduce_phase_distributed: bool,
        composite: bool,
    ) -> Result<TaskPart> {
        let is_local = &target == self.node.address();
        let mapper = if is_local { mapper.duplicate() } else { mapper.clone() };
        let combiner = self
            .combiner
            .as_ref()
            .map(|combiner| self.isolate_reducer(&target, combiner));

        let command = CommandsFactory::build_map_combine_command(
            &self.task_id,
            self.cache.name(),
            mapper.as_ref(),
            combiner.as_deref(),
            keys,
        )?
        .with_reduce_phase_distributed(reduce_phase_distributed)
        .with_composite_intermediate_keys(composite)
        .with_intermediate_cache_name(self.intermediate_cache_name())
        .with_max_collector_size(MAX_COLLECTOR_SIZE);

        self.register_part(&command.part_id, &target);
        Ok(TaskPart::new(
            target,
            PartWork::Map(MapCombineJob {
                command,
                mapper,
                combiner,
            }),
        ))
    }

    /// In-process parts get their own copy of the function.
    fn isolate_reducer(
        &self,
        target: &Address,
        reducer: &Arc<dyn ReduceFunction>,
    ) -> Arc<dyn ReduceFunction> {
        if target == self.node.address() {
            reducer.duplicate()
        } else {
            reducer.clone()
        }
    }

    async fn await_part(&self, part: TaskPart) -> Result<Value> {
        let address = part.execution_target().clone();
        let phase = part.phase();
        match part.get().await {
            Err(GridError::Rpc(source @ RpcError::Timeout { .. })) => Err(GridError::PhaseTimeout {
                phase,
                address,
                timeout: self.rpc_options.timeout,
                source,
            }),
            other => other,
        }
    }

    fn register_part(&self, part_id: &PartId, target: &Address) {
        self.cancellable_parts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(CancellablePart {
                part_id: part_id.clone(),
                target: target.clone(),
            });
    }

    fn clear_parts(&self) {
        self.cancellable_parts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.node.transport().ok_or_else(|| {
            GridError::Configuration("distributed execution requires a cluster transport".into())
        })
    }
}

/// Appends a node's grouped output to the shared result map.
pub(crate) fn merge_response(
    merged: &Mutex<HashMap<String, Vec<Value>>>,
    partial: Vec<(String, Vec<Value>)>,
) {
    let mut guard = merged.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for (key, values) in partial {
        guard.entry(key).or_default().extend(values);
    }
}

fn reduce_entries<KOut: GridKey, VOut: GridValue>(
    reducer: &dyn ReduceFunction,
    grouped: HashMap<String, Vec<Value>>,
) -> Result<HashMap<KOut, VOut>> {
    let mut reduced = HashMap::with_capacity(grouped.len());
    for (key, values) in grouped {
        let value = reducer.reduce(&key, values)?;
        reduced.insert(decode_key::<KOut>(&key)?, serde_json::from_value(value)?);
    }
    Ok(reduced)
}

fn ensure_access_permissions(cache: &GridCache) -> Result<()> {
    match cache.authorization() {
        Some(manager) => manager.check_permission(Permission::Exec),
        None => Ok(()),
    }
}

fn ensure_proper_cache_state(node: &GridNode, cache: &GridCache) -> Result<()> {
    let status = cache.status();
    if status != CacheStatus::Running {
        return Err(GridError::InvalidCacheState(format!(
            "cache {} is {:?}, it must be running",
            cache.name(),
            status
        )));
    }
    if node.is_clustered() && cache.mode() == CacheMode::Invalidation {
        return Err(GridError::InvalidCacheState(format!(
            "cache {} is in {} mode, MapReduce requires a distributed or replicated cache",
            cache.name(),
            cache.mode()
        )));
    }
    Ok(())
}

impl<KIn, VIn, KOut, VOut> PartialEq for MapReduceTask<KIn, VIn, KOut, VOut> {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}

impl<KIn, VIn, KOut, VOut> Eq for MapReduceTask<KIn, VIn, KOut, VOut> {}

impl<KIn: ToString, VIn, KOut, VOut> fmt::Display for MapReduceTask<KIn, VIn, KOut, VOut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys.iter().map(|key| key.to_string()).collect();
        write!(
            f,
            "MapReduceTask [mapper={}, reducer={}, combiner={}, keys={:?}, task_id={}]",
            self.mapper.as_ref().map_or("none", |m| m.name()),
            self.reducer.as_ref().map_or("none", |r| r.name()),
            self.combiner.as_ref().map_or("none", |c| c.name()),
            keys,
            self.task_id
        )
    }
}

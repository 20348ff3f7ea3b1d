//! Node-side MapReduce Execution
//!
//! Runs the map-combine and reduce work of a single task part against the
//! caches of this node, whether the part was sent by a remote coordinator or
//! dispatched in-process.
//!
//! ## Execution Model
//! - A semaphore bounds how many parts run at once (`worker_count`).
//! - User functions run on the blocking pool; cancellation is checked
//!   between entries.
//! - With a distributed reduce phase, map output is combined and flushed to
//!   the intermediate cache every `max_collector_size` values by an async
//!   flusher, so the mapper never waits on the network.

use super::cancellation::CancellationService;
use super::functions::{EmitBuffer, FunctionRegistry, MapFunction, ReduceFunction};
use super::lifecycle::TaskLifecycleService;
use super::types::{PartId, intermediate_storage_key};
use crate::commands::types::{MapCombineCommand, ReduceCommand};
use crate::error::{GridError, Result};
use crate::storage::manager::CacheManager;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

/// A map-combine command together with the functions that execute it.
pub struct MapCombineJob {
    pub command: MapCombineCommand,
    pub mapper: Arc<dyn MapFunction>,
    pub combiner: Option<Arc<dyn ReduceFunction>>,
}

pub struct ReduceJob {
    pub command: ReduceCommand,
    pub reducer: Arc<dyn ReduceFunction>,
}

/// What a map-combine part hands back to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MapCombineOutput {
    /// Output keys written to the intermediate cache (distributed reduce).
    Keys(BTreeSet<String>),
    /// Combined values grouped by key (reduce runs on the coordinator).
    Grouped(Vec<(String, Vec<Value>)>),
}

pub struct MapReduceManager {
    caches: Arc<CacheManager>,
    cancellation: Arc<CancellationService>,
    functions: Arc<FunctionRegistry>,
    lifecycle: Arc<TaskLifecycleService>,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl MapReduceManager {
    pub fn new(
        caches: Arc<CacheManager>,
        cancellation: Arc<CancellationService>,
        functions: Arc<FunctionRegistry>,
        lifecycle: Arc<TaskLifecycleService>,
        worker_count: usize,
    ) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        Arc::new(Self {
            caches,
            cancellation,
            functions,
            lifecycle,
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Rebuilds the shipped functions of a received command.
    pub fn resolve_map_combine(&self, command: MapCombineCommand) -> Result<MapCombineJob> {
        let mapper = self.functions.resolve_mapper(&command.mapper)?;
        let combiner = command
            .combiner
            .as_ref()
            .map(|descriptor| self.functions.resolve_reducer(descriptor))
            .transpose()?;
        Ok(MapCombineJob {
            command,
            mapper,
            combiner,
        })
    }

    pub fn resolve_reduce(&self, command: ReduceCommand) -> Result<ReduceJob> {
        let reducer = self.functions.resolve_reducer(&command.reducer)?;
        Ok(ReduceJob { command, reducer })
    }

    pub async fn map_and_combine(&self, job: MapCombineJob) -> Result<MapCombineOutput> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GridError::Worker(e.to_string()))?;

        let part_id = job.command.part_id.clone();
        tracing::debug!(
            "Map-combine part {} of task {} on cache {}",
            part_id,
            job.command.task_id,
            job.command.cache_name
        );

        let token = self.cancellation.register(&part_id);
        let result = self.run_map_combine(job, token).await;
        self.cancellation.unregister(&part_id);
        result
    }

    async fn run_map_combine(
        &self,
        job: MapCombineJob,
        token: tokio_util::sync::CancellationToken,
    ) -> Result<MapCombineOutput> {
        let MapCombineJob {
            command,
            mapper,
            combiner,
        } = job;

        let input = self.caches.get_or_create_cache(&command.cache_name);
        let entries = match &command.keys {
            Some(keys) => input.local_entries_for(keys),
            None => input.local_primary_entries(),
        };

        let distributed = command.reduce_phase_distributed;
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<(String, Vec<Value>)>>();

        let flusher = if distributed {
            let intermediate = self
                .caches
                .get_cache(&command.intermediate_cache_name)
                .ok_or_else(|| GridError::NoSuchCache(command.intermediate_cache_name.clone()))?;
            let task_id = command.task_id.clone();
            let composite = command.emit_composite_intermediate_keys;

            Some(tokio::spawn(async move {
                let mut emitted = BTreeSet::new();
                while let Some(batch) = rx.recv().await {
                    let mut staged = Vec::with_capacity(batch.len());
                    for (key, values) in batch {
                        staged.push((intermediate_storage_key(&task_id, &key, composite), values));
                        emitted.insert(key);
                    }
                    intermediate.append_raw(staged).await?;
                }
                Ok::<_, GridError>(emitted)
            }))
        } else {
            None
        };

        let max_collector_size = command.max_collector_size.max(1);
        let part_id = command.part_id.clone();
        let mapped = tokio::task::spawn_blocking(move || {
            let mut buffer = EmitBuffer::new(token.clone());
            for (key, value) in entries {
                if token.is_cancelled() {
                    return Err(GridError::Cancelled(part_id.to_string()));
                }
                mapper.map(&key, &value, &mut buffer)?;

                if distributed && buffer.len() >= max_collector_size {
                    let batch = combine(combiner.as_deref(), buffer.take())?;
                    tx.send(batch)
                        .map_err(|_| GridError::Worker("intermediate flusher stopped".into()))?;
                }
            }
            if token.is_cancelled() {
                return Err(GridError::Cancelled(part_id.to_string()));
            }

            let remaining = combine(combiner.as_deref(), buffer.take())?;
            if distributed {
                tx.send(remaining)
                    .map_err(|_| GridError::Worker("intermediate flusher stopped".into()))?;
                Ok(None)
            } else {
                Ok(Some(remaining))
            }
        })
        .await
        .map_err(|e| GridError::Worker(e.to_string()))?;

        match flusher {
            Some(flusher) => {
                let flushed = flusher
                    .await
                    .map_err(|e| GridError::Worker(e.to_string()))?;
                // A failed flush also stops the mapper, so report it first.
                let emitted = flushed?;
                mapped?;
                Ok(MapCombineOutput::Keys(emitted))
            }
            None => match mapped? {
                Some(grouped) => Ok(MapCombineOutput::Grouped(grouped)),
                None => Ok(MapCombineOutput::Grouped(Vec::new())),
            },
        }
    }

    /// Reduces the given intermediate keys from the local copy of the
    /// intermediate cache. Results go to the result cache when one is named,
    /// in which case nothing is returned.
    pub async fn reduce(&self, job: ReduceJob) -> Result<Vec<(String, Value)>> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GridError::Worker(e.to_string()))?;

        let part_id = job.command.part_id.clone();
        let token = self.cancellation.register(&part_id);
        let result = self.run_reduce(job, token, &part_id).await;
        self.cancellation.unregister(&part_id);
        result
    }

    async fn run_reduce(
        &self,
        job: ReduceJob,
        token: tokio_util::sync::CancellationToken,
        part_id: &PartId,
    ) -> Result<Vec<(String, Value)>> {
        let ReduceJob { command, reducer } = job;
        let composite = command.emit_composite_intermediate_keys;

        let intermediate = self
            .caches
            .get_cache(&command.intermediate_cache_name)
            .ok_or_else(|| GridError::NoSuchCache(command.intermediate_cache_name.clone()))?;

        let inputs: Vec<(String, Vec<Value>)> = command
            .keys
            .iter()
            .filter_map(|key| {
                let storage_key = intermediate_storage_key(&command.task_id, key, composite);
                intermediate
                    .get_local_raw(&storage_key)
                    .map(|stored| (key.clone(), into_values(stored)))
            })
            .collect();

        self.lifecycle
            .on_pre_execute(reducer.name(), &command.intermediate_cache_name);

        let cancelled_part = part_id.to_string();
        let reduced = tokio::task::spawn_blocking(move || {
            let mut reduced = Vec::with_capacity(inputs.len());
            for (key, values) in inputs {
                if token.is_cancelled() {
                    return Err(GridError::Cancelled(cancelled_part));
                }
                let value = reducer.reduce(&key, values)?;
                reduced.push((key, value));
            }
            Ok(reduced)
        })
        .await
        .map_err(|e| GridError::Worker(e.to_string()));

        self.lifecycle.on_post_execute(&command.reducer.name);
        let reduced = reduced??;

        if composite {
            let consumed = command
                .keys
                .iter()
                .map(|key| intermediate_storage_key(&command.task_id, key, true))
                .collect();
            intermediate.remove_raw(consumed).await?;
        }

        match &command.result_cache_name {
            Some(name) => {
                let results = self.caches.get_or_create_cache(name);
                for (key, value) in reduced {
                    results.put_raw(key, value).await?;
                }
                Ok(Vec::new())
            }
            None => Ok(reduced),
        }
    }
}

/// Applies the combiner to every key, or passes values through untouched.
pub(crate) fn combine(
    combiner: Option<&dyn ReduceFunction>,
    grouped: HashMap<String, Vec<Value>>,
) -> Result<Vec<(String, Vec<Value>)>> {
    match combiner {
        Some(combiner) => grouped
            .into_iter()
            .map(|(key, values)| {
                let combined = combiner.reduce(&key, values)?;
                Ok((key, vec![combined]))
            })
            .collect(),
        None => Ok(grouped.into_iter().collect()),
    }
}

fn into_values(stored: Value) -> Vec<Value> {
    match stored {
        Value::Array(values) => values,
        single => vec![single],
    }
}

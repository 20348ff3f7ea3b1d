//! Commands Factory
//!
//! Builds commands with every field populated, so the coordinator only
//! tweaks the phase-specific flags afterwards.

use super::types::*;
use crate::error::Result;
use crate::mapreduce::functions::{MapFunction, ReduceFunction};
use crate::mapreduce::types::{PartId, TaskId};

pub const DEFAULT_MAX_COLLECTOR_SIZE: usize = 1000;

pub struct CommandsFactory;

impl CommandsFactory {
    /// Map-combine command for `cache_name`. The intermediate cache name
    /// defaults to the task id; the caller overrides it for shared caches.
    pub fn build_map_combine_command(
        task_id: &TaskId,
        cache_name: &str,
        mapper: &dyn MapFunction,
        combiner: Option<&dyn ReduceFunction>,
        keys: Option<Vec<String>>,
    ) -> Result<MapCombineCommand> {
        Ok(MapCombineCommand {
            task_id: task_id.clone(),
            part_id: PartId::new(),
            cache_name: cache_name.to_string(),
            mapper: mapper.descriptor()?,
            combiner: combiner.map(|c| c.descriptor()).transpose()?,
            keys,
            intermediate_cache_name: task_id.to_string(),
            reduce_phase_distributed: false,
            emit_composite_intermediate_keys: false,
            max_collector_size: DEFAULT_MAX_COLLECTOR_SIZE,
        })
    }

    pub fn build_reduce_command(
        task_id: &TaskId,
        intermediate_cache_name: &str,
        reducer: &dyn ReduceFunction,
        keys: Vec<String>,
    ) -> Result<ReduceCommand> {
        Ok(ReduceCommand {
            task_id: task_id.clone(),
            part_id: PartId::new(),
            intermediate_cache_name: intermediate_cache_name.to_string(),
            reducer: reducer.descriptor()?,
            keys,
            emit_composite_intermediate_keys: false,
            result_cache_name: None,
        })
    }

    pub fn build_cancel_command(part_id: &PartId) -> CancelCommand {
        CancelCommand {
            part_id: part_id.clone(),
        }
    }

    pub fn build_create_cache_command(cache_name: &str, configuration_name: &str) -> CreateCacheCommand {
        CreateCacheCommand {
            cache_name: cache_name.to_string(),
            configuration_name: configuration_name.to_string(),
        }
    }

    pub fn build_remove_cache_command(cache_name: &str) -> RemoveCacheCommand {
        RemoveCacheCommand {
            cache_name: cache_name.to_string(),
        }
    }
}

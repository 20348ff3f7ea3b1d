use super::ReplicableCommand;
use crate::mapreduce::functions::FunctionDescriptor;
use crate::mapreduce::types::{PartId, TaskId};

use serde::{Deserialize, Serialize};

// ============================================================
// Cache provisioning
// ============================================================

/// Creates (or reuses) a cache from a named configuration on the receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateCacheCommand {
    pub cache_name: String,
    pub configuration_name: String,
}

impl ReplicableCommand for CreateCacheCommand {
    const TAG: &'static str = "cache.create";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveCacheCommand {
    pub cache_name: String,
}

impl ReplicableCommand for RemoveCacheCommand {
    const TAG: &'static str = "cache.remove";
}

// ============================================================
// Entry routing
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PutEntryCommand {
    pub cache_name: String,
    pub key: String,
    pub value: serde_json::Value,
}

impl ReplicableCommand for PutEntryCommand {
    const TAG: &'static str = "cache.put";
}

/// Appends values to the list stored under each key, creating it if absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppendEntriesCommand {
    pub cache_name: String,
    pub entries: Vec<(String, Vec<serde_json::Value>)>,
}

impl ReplicableCommand for AppendEntriesCommand {
    const TAG: &'static str = "cache.append";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetEntryCommand {
    pub cache_name: String,
    pub key: String,
}

impl ReplicableCommand for GetEntryCommand {
    const TAG: &'static str = "cache.get";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveEntriesCommand {
    pub cache_name: String,
    pub keys: Vec<String>,
}

impl ReplicableCommand for RemoveEntriesCommand {
    const TAG: &'static str = "cache.remove_entries";
}

// ============================================================
// MapReduce
// ============================================================

/// Map (plus optional combine) over the receiver's share of the input cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapCombineCommand {
    pub task_id: TaskId,
    pub part_id: PartId,
    pub cache_name: String,
    pub mapper: FunctionDescriptor,
    pub combiner: Option<FunctionDescriptor>,
    /// `None` means every entry the receiver is primary owner of.
    pub keys: Option<Vec<String>>,
    pub intermediate_cache_name: String,
    pub reduce_phase_distributed: bool,
    pub emit_composite_intermediate_keys: bool,
    pub max_collector_size: usize,
}

impl MapCombineCommand {
    pub fn with_reduce_phase_distributed(mut self, distributed: bool) -> Self {
        self.reduce_phase_distributed = distributed;
        self
    }

    pub fn with_composite_intermediate_keys(mut self, composite: bool) -> Self {
        self.emit_composite_intermediate_keys = composite;
        self
    }

    pub fn with_intermediate_cache_name(mut self, name: impl Into<String>) -> Self {
        self.intermediate_cache_name = name.into();
        self
    }

    pub fn with_max_collector_size(mut self, size: usize) -> Self {
        self.max_collector_size = size;
        self
    }
}

impl ReplicableCommand for MapCombineCommand {
    const TAG: &'static str = "mapreduce.map_combine";
}

/// Reduce a set of intermediate keys the receiver owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReduceCommand {
    pub task_id: TaskId,
    pub part_id: PartId,
    pub intermediate_cache_name: String,
    pub reducer: FunctionDescriptor,
    pub keys: Vec<String>,
    pub emit_composite_intermediate_keys: bool,
    /// When set, reduced values are stored there instead of returned.
    pub result_cache_name: Option<String>,
}

impl ReduceCommand {
    pub fn with_composite_intermediate_keys(mut self, composite: bool) -> Self {
        self.emit_composite_intermediate_keys = composite;
        self
    }

    pub fn with_result_cache_name(mut self, name: Option<String>) -> Self {
        self.result_cache_name = name;
        self
    }

    pub fn emits_into_result_cache(&self) -> bool {
        self.result_cache_name.is_some()
    }
}

impl ReplicableCommand for ReduceCommand {
    const TAG: &'static str = "mapreduce.reduce";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelCommand {
    pub part_id: PartId,
}

impl ReplicableCommand for CancelCommand {
    const TAG: &'static str = "mapreduce.cancel";
}

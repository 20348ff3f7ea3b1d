use dashmap::DashMap;
use serde_json::Value;

/// Node-local entries of one cache, bucketed by partition.
///
/// Keys are the string form of the user key and values are JSON, so every
/// cache shares one representation regardless of its typed facade.
#[derive(Default)]
pub struct PartitionedStore {
    local_data: DashMap<u32, DashMap<String, Value>>,
}

impl PartitionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_local(&self, partition: u32, key: String, value: Value) {
        let partition_map = self.local_data.entry(partition).or_default();
        partition_map.insert(key, value);
    }

    /// Appends to the JSON array stored under `key`. A missing entry starts
    /// a new array; a scalar entry is turned into a one-element array first.
    pub fn append_local(&self, partition: u32, key: String, values: Vec<Value>) {
        let partition_map = self.local_data.entry(partition).or_default();
        let mut entry = partition_map
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));

        match entry.value_mut() {
            Value::Array(list) => list.extend(values),
            scalar => {
                let mut list = vec![scalar.take()];
                list.extend(values);
                *scalar = Value::Array(list);
            }
        }
    }

    pub fn get_local(&self, partition: u32, key: &str) -> Option<Value> {
        self.local_data
            .get(&partition)
            .and_then(|partition_map| partition_map.get(key).map(|value| value.clone()))
    }

    pub fn remove_local(&self, partition: u32, key: &str) -> Option<Value> {
        self.local_data
            .get(&partition)
            .and_then(|partition_map| partition_map.remove(key).map(|(_, value)| value))
    }

    pub fn dump_partition(&self, partition: u32) -> Vec<(String, Value)> {
        let mut entries = Vec::new();
        if let Some(partition_map) = self.local_data.get(&partition) {
            for entry in partition_map.iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        entries
    }

    /// Partitions currently holding at least one entry.
    pub fn partitions(&self) -> Vec<u32> {
        self.local_data
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn local_entry_count(&self) -> usize {
        self.local_data
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    pub fn clear(&self) {
        self.local_data.clear();
    }
}

use crate::cluster::transport::Transport;
use crate::cluster::types::Address;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Hash partitioning of keys onto cluster members.
///
/// A key hashes into one of `num_partitions` buckets. Owners of a bucket are
/// taken from the sorted member list: the primary at `partition % n`, then
/// the following members in order until `num_owners` are picked.
pub struct PartitionManager {
    num_partitions: u32,
    local: Address,
    transport: Option<Arc<dyn Transport>>,
}

impl PartitionManager {
    pub fn new(num_partitions: u32, local: Address, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
            local,
            transport,
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn local_address(&self) -> &Address {
        &self.local
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    /// Sorted member list; a node without transport is alone.
    pub fn members(&self) -> Vec<Address> {
        let mut members = match &self.transport {
            Some(transport) => transport.members(),
            None => vec![self.local.clone()],
        };
        members.sort();
        members.dedup();
        members
    }

    pub fn get_owners(&self, partition: u32, num_owners: usize) -> Vec<Address> {
        let members = self.members();
        if members.is_empty() {
            return vec![];
        }
        let count = num_owners.clamp(1, members.len());
        let primary_idx = (partition as usize) % members.len();
        (0..count)
            .map(|offset| members[(primary_idx + offset) % members.len()].clone())
            .collect()
    }

    pub fn primary_owner(&self, key: &str) -> Address {
        let partition = self.get_partition(key);
        self.get_owners(partition, 1)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.local.clone())
    }

    pub fn is_primary(&self, partition: u32) -> bool {
        self.get_owners(partition, 1).first() == Some(&self.local)
    }

    pub fn my_primary_partitions(&self) -> Vec<u32> {
        (0..self.num_partitions)
            .filter(|&partition| self.is_primary(partition))
            .collect()
    }
}

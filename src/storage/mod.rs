//! Distributed Storage Module
//!
//! Named in-memory caches spread over the cluster.
//!
//! ## Core Concepts
//! - **Partitioning**: keys hash into fixed partitions (`PartitionManager`).
//! - **Placement**: each partition has a primary owner plus backups, taken in
//!   order from the sorted member list.
//! - **Modes**: local, replicated, distributed or invalidation (`CacheMode`).
//! - **Access**: `GridCache` routes reads and writes to the owners;
//!   `Cache<K, V>` adds typed keys and values on top.
//! - **Lifecycle**: `CacheManager` starts caches from named configurations
//!   and removes them locally or cluster-wide.

pub mod cache;
pub mod handlers;
pub mod manager;
pub mod memory;
pub mod partitioner;
pub mod protocol;

//! Node Configuration
//!
//! Command-line flags first, then `GRID_*` environment overrides for the
//! tuning knobs, then built-in defaults.

use crate::cluster::types::Address;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PARTITIONS: u32 = 256;
pub const DEFAULT_NUM_OWNERS: usize = 2;

/// Runtime knobs shared by every node component.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    /// Map/reduce parts allowed to run concurrently on this node.
    pub worker_count: usize,
    pub rpc_timeout: Duration,
    pub num_partitions: u32,
    /// Owners per entry for distributed caches.
    pub num_owners: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            num_partitions: DEFAULT_PARTITIONS,
            num_owners: DEFAULT_NUM_OWNERS,
        }
    }
}

impl NodeSettings {
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_num_owners(mut self, owners: usize) -> Self {
        self.num_owners = owners.max(1);
        self
    }

    /// Applies `GRID_WORKERS` and `GRID_RPC_TIMEOUT_MS` when set.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var("GRID_WORKERS") {
            let workers: usize = raw.parse().context("GRID_WORKERS must be a number")?;
            self = self.with_worker_count(workers);
        }
        if let Ok(raw) = std::env::var("GRID_RPC_TIMEOUT_MS") {
            let millis: u64 = raw.parse().context("GRID_RPC_TIMEOUT_MS must be a number")?;
            self = self.with_rpc_timeout(Duration::from_millis(millis));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind: SocketAddr,
    pub peers: Vec<SocketAddr>,
    pub settings: NodeSettings,
}

impl NodeConfig {
    /// Parses `--bind`, `--peer` (repeatable), `--workers`, `--timeout-ms`
    /// and `--partitions`. Unknown flags are ignored.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut bind: Option<SocketAddr> = None;
        let mut peers = Vec::new();
        let mut settings = NodeSettings::default().apply_env()?;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--bind", Some(v)) => {
                    bind = Some(v.parse().context("invalid --bind address")?);
                    i += 2;
                }
                ("--peer", Some(v)) => {
                    peers.push(v.parse().context("invalid --peer address")?);
                    i += 2;
                }
                ("--workers", Some(v)) => {
                    settings = settings.with_worker_count(v.parse().context("invalid --workers")?);
                    i += 2;
                }
                ("--timeout-ms", Some(v)) => {
                    let millis: u64 = v.parse().context("invalid --timeout-ms")?;
                    settings = settings.with_rpc_timeout(Duration::from_millis(millis));
                    i += 2;
                }
                ("--partitions", Some(v)) => {
                    settings.num_partitions = v.parse().context("invalid --partitions")?;
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }

        let bind = bind.context("--bind is required")?;
        Ok(Self {
            bind,
            peers,
            settings,
        })
    }

    pub fn local_address(&self) -> Address {
        Address::new(self.bind.to_string())
    }

    pub fn peer_addresses(&self) -> Vec<Address> {
        self.peers
            .iter()
            .map(|peer| Address::new(peer.to_string()))
            .collect()
    }
}

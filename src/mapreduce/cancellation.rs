//! Cancellation Service
//!
//! Every task part running on this node registers a `CancellationToken` under
//! its part id. A cancel request (local, or a `CancelCommand` from the
//! coordinator) trips the token; the map and reduce loops check it between
//! entries.

use crate::mapreduce::types::PartId;

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Upper bound on remembered cancel requests.
const MAX_CANCEL_HISTORY: usize = 10_000;

pub struct CancellationService {
    active: DashMap<PartId, CancellationToken>,
    requested: DashSet<PartId>,
}

impl CancellationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
            requested: DashSet::new(),
        })
    }

    /// Registers a running part. A cancel that arrived before the part
    /// started yields an already cancelled token.
    pub fn register(&self, part_id: &PartId) -> CancellationToken {
        let token = CancellationToken::new();
        if self.requested.contains(part_id) {
            token.cancel();
        }
        self.active.insert(part_id.clone(), token.clone());
        token
    }

    pub fn unregister(&self, part_id: &PartId) {
        self.active.remove(part_id);
    }

    /// Trips the token of `part_id`. Returns false when nothing was running
    /// under that id on this node.
    pub fn cancel(&self, part_id: &PartId) -> bool {
        if self.requested.len() >= MAX_CANCEL_HISTORY {
            self.requested.clear();
        }
        self.requested.insert(part_id.clone());

        match self.active.get(part_id) {
            Some(token) => {
                token.cancel();
                tracing::info!("Cancelled task part {}", part_id);
                true
            }
            None => {
                tracing::debug!("Cancel for unknown task part {}", part_id);
                false
            }
        }
    }

    pub fn is_registered(&self, part_id: &PartId) -> bool {
        self.active.contains_key(part_id)
    }

    /// True if a cancel was ever requested for `part_id` on this node.
    pub fn was_cancelled(&self, part_id: &PartId) -> bool {
        self.requested.contains(part_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

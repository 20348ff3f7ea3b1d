use super::task::{CancellablePart, CancellableParts};
use super::types::PartId;
use crate::cluster::types::RpcOptions;
use crate::commands::ReplicableCommand;
use crate::commands::factory::CommandsFactory;
use crate::error::{GridError, Result};
use crate::node::GridNode;

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sends cancel requests to the parts a task currently has in flight.
pub struct TaskCanceller {
    node: Arc<GridNode>,
    parts: CancellableParts,
    rpc_options: RpcOptions,
}

impl TaskCanceller {
    pub(crate) fn new(node: Arc<GridNode>, parts: CancellableParts, rpc_options: RpcOptions) -> Self {
        Self {
            node,
            parts,
            rpc_options,
        }
    }

    pub fn active_parts(&self) -> Vec<CancellablePart> {
        self.parts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Fires a cancel at every registered part without waiting for replies.
    /// Returns how many parts were signalled.
    pub fn cancel_parts(&self) -> usize {
        let parts = self.active_parts();
        for part in &parts {
            if &part.target == self.node.address() {
                if !self.node.cancellation.cancel(&part.part_id) {
                    tracing::debug!("Local part {} already finished", part.part_id);
                }
            } else {
                self.cancel_remotely(part);
            }
        }
        parts.len()
    }

    fn cancel_remotely(&self, part: &CancellablePart) {
        let Some(transport) = self.node.transport() else {
            tracing::warn!("No transport to cancel part {} at {}", part.part_id, part.target);
            return;
        };
        let envelope = match CommandsFactory::build_cancel_command(&part.part_id).to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Could not encode cancel for part {}: {}", part.part_id, e);
                return;
            }
        };

        let target = part.target.clone();
        let part_id = part.part_id.clone();
        let options = self.rpc_options.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.invoke(&target, envelope, &options).await {
                tracing::warn!("Cancel of part {} at {} failed: {}", part_id, target, e);
            }
        });
    }
}

/// Handle to a MapReduce task started with `execute_asynchronously`.
///
/// Nothing runs until `get` is awaited. `cancel` is best effort: it signals
/// the parts in flight and marks the future cancelled and done immediately.
pub struct TaskFuture<R> {
    work: tokio::sync::Mutex<Option<BoxFuture<'static, Result<R>>>>,
    canceller: TaskCanceller,
    cancelled: AtomicBool,
    done: AtomicBool,
}

impl<R: Send + 'static> TaskFuture<R> {
    pub(crate) fn new<F>(canceller: TaskCanceller, work: F) -> Self
    where
        F: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            work: tokio::sync::Mutex::new(Some(Box::pin(work))),
            canceller,
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    /// Runs the task to completion. A second call, or a call after
    /// cancellation, fails.
    pub async fn get(&self) -> Result<R> {
        if self.is_cancelled() {
            return Err(GridError::TaskCancelled);
        }

        let work = self.work.lock().await.take().ok_or_else(|| {
            GridError::Configuration("MapReduce task result was already consumed".into())
        })?;

        let result = work.await;
        self.done.store(true, Ordering::SeqCst);

        if self.is_cancelled() && result.is_err() {
            return Err(GridError::TaskCancelled);
        }
        result
    }

    /// Cancels the parts in flight.
    ///
    /// Returns false, leaving the task runnable, when no part has been
    /// dispatched yet. Also false if the task had already completed or was
    /// cancelled before.
    pub fn cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }
        if self.is_cancelled() {
            return false;
        }

        let signalled = self.canceller.cancel_parts();
        if signalled == 0 {
            tracing::debug!("Cancel requested with no parts in flight, task keeps running");
            return false;
        }
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!("MapReduce task cancelled, {} parts signalled", signalled);
        self.done.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Part ids currently registered for cancellation.
    pub fn active_parts(&self) -> Vec<PartId> {
        self.canceller
            .active_parts()
            .into_iter()
            .map(|part| part.part_id)
            .collect()
    }
}

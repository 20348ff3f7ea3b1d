use super::manager::{MapCombineJob, ReduceJob};
use super::types::PartId;
use crate::cluster::transport::invoke_remotely_in_future;
use crate::cluster::types::{Address, Response, RpcOptions, unwrap_single_response};
use crate::commands::ReplicableCommand;
use crate::error::{GridError, Result, RpcError};
use crate::node::GridNode;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The work a part carries.
pub enum PartWork {
    Map(MapCombineJob),
    Reduce(ReduceJob),
}

impl PartWork {
    pub fn part_id(&self) -> &PartId {
        match self {
            PartWork::Map(job) => &job.command.part_id,
            PartWork::Reduce(job) => &job.command.part_id,
        }
    }

    fn phase(&self) -> &'static str {
        match self {
            PartWork::Map(_) => "Map",
            PartWork::Reduce(_) => "Reduce",
        }
    }
}

enum PartHandle {
    Local(JoinHandle<Result<Value>>),
    Remote(JoinHandle<std::result::Result<HashMap<Address, Response>, RpcError>>),
}

/// One node-scoped unit of map or reduce work.
///
/// A part is created with its target and work, started with `execute` and
/// resolved with `get`. Local targets run on this node's `MapReduceManager`;
/// remote targets receive the command through the transport.
pub struct TaskPart {
    target: Address,
    part_id: PartId,
    phase: &'static str,
    work: Option<PartWork>,
    handle: Option<PartHandle>,
}

impl TaskPart {
    pub fn new(target: Address, work: PartWork) -> Self {
        Self {
            target,
            part_id: work.part_id().clone(),
            phase: work.phase(),
            work: Some(work),
            handle: None,
        }
    }

    pub fn part_id(&self) -> &PartId {
        &self.part_id
    }

    pub fn execution_target(&self) -> &Address {
        &self.target
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    /// Starts the part in the background.
    pub fn execute(&mut self, node: &Arc<GridNode>, options: &RpcOptions) -> Result<()> {
        let work = self.work.take().ok_or_else(|| {
            GridError::Worker(format!("task part {} already started", self.part_id))
        })?;

        if &self.target == node.address() {
            tracing::debug!("Running {} part {} locally", self.phase, self.part_id);
            let manager = node.mapreduce.clone();
            let handle = tokio::spawn(async move {
                let value = match work {
                    PartWork::Map(job) => serde_json::to_value(manager.map_and_combine(job).await?)?,
                    PartWork::Reduce(job) => serde_json::to_value(manager.reduce(job).await?)?,
                };
                Ok::<_, GridError>(value)
            });
            self.handle = Some(PartHandle::Local(handle));
        } else {
            let transport = node.transport().ok_or_else(|| {
                GridError::Configuration(format!(
                    "no transport to reach {} for part {}",
                    self.target, self.part_id
                ))
            })?;
            let envelope = match &work {
                PartWork::Map(job) => job.command.to_envelope()?,
                PartWork::Reduce(job) => job.command.to_envelope()?,
            };
            let handle = invoke_remotely_in_future(
                transport,
                self.target.clone(),
                envelope,
                options.clone(),
            );
            self.handle = Some(PartHandle::Remote(handle));
        }
        Ok(())
    }

    /// Waits for the part and extracts its payload.
    pub async fn get(self) -> Result<Value> {
        let responses = match self.handle {
            None => {
                return Err(GridError::Worker(format!(
                    "task part {} was never started",
                    self.part_id
                )));
            }
            Some(PartHandle::Local(handle)) => {
                let value = handle
                    .await
                    .map_err(|e| GridError::Worker(e.to_string()))??;
                HashMap::from([(self.target, Response::Success(value))])
            }
            Some(PartHandle::Remote(handle)) => handle
                .await
                .map_err(|e| GridError::Worker(e.to_string()))??,
        };
        unwrap_single_response(responses)
    }
}

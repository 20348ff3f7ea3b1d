//! Command Registry
//!
//! Maps command tags (e.g. "mapreduce.map_combine") to async handlers. Each
//! registration binds a decoder for the command payload and the code that
//! executes it against local state, so new commands never touch dispatch.

use super::{CommandEnvelope, ReplicableCommand};
use crate::cluster::types::Response;
use crate::error::{GridError, Result};

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased handler: takes the raw payload, returns the reply payload.
pub type CommandHandlerFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

pub struct CommandRegistry {
    handlers: DashMap<String, CommandHandlerFn>,
}

impl CommandRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers the handler for command type `C` under `C::TAG`.
    ///
    /// The payload is decoded into `C` before the handler runs; a decoding
    /// failure is reported to the caller like any other handler error.
    pub fn register<C, F, Fut>(&self, handler: F)
    where
        C: ReplicableCommand,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let handler_fn: CommandHandlerFn = Arc::new(move |payload: serde_json::Value| {
            let handler = handler.clone();
            Box::pin(async move {
                let command: C = serde_json::from_value(payload)?;
                handler(command).await
            }) as Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        });

        self.handlers.insert(C::TAG.to_string(), handler_fn);
        tracing::debug!("Registered command handler: {}", C::TAG);
    }

    /// Runs the handler registered for the envelope's tag.
    pub async fn execute(&self, envelope: CommandEnvelope) -> Result<serde_json::Value> {
        // Clone the handler out so no map guard is held across the await.
        let handler_fn = self
            .handlers
            .get(&envelope.tag)
            .map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => handler_fn(envelope.payload).await,
            None => {
                tracing::error!("Unknown command: {}", envelope.tag);
                Err(GridError::UnknownCommand(envelope.tag))
            }
        }
    }

    /// Executes the envelope and folds the outcome into a `Response`.
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> Response {
        let tag = envelope.tag.clone();
        match self.execute(envelope).await {
            Ok(value) => Response::Success(value),
            Err(e) => {
                tracing::warn!("Command {} failed: {}", tag, e);
                Response::Exception(e.to_string())
            }
        }
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_command(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    pub fn command_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

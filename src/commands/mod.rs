//! Replicable Commands
//!
//! Every interaction between nodes is a serializable command. A command type
//! carries a static tag; on the wire it travels inside a `CommandEnvelope`
//! and the receiving node looks the tag up in its `CommandRegistry`.
//!
//! ## Submodules
//! - **`types`**: the command payloads (cache provisioning, entry routing,
//!   map-combine, reduce, cancel).
//! - **`factory`**: builds fully populated commands for the coordinator.
//! - **`registry`**: tag to handler table and the dispatch entry point.

pub mod factory;
pub mod registry;
pub mod types;


use crate::error::{GridError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire representation of a command: its tag plus the JSON-encoded payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub tag: String,
    pub payload: serde_json::Value,
}

/// A command that can be shipped to another node and executed there.
pub trait ReplicableCommand: Serialize + DeserializeOwned + Send + 'static {
    /// Unique identifier used to find the decoder and handler.
    const TAG: &'static str;

    fn to_envelope(&self) -> Result<CommandEnvelope> {
        Ok(CommandEnvelope {
            tag: Self::TAG.to_string(),
            payload: serde_json::to_value(self)?,
        })
    }

    fn from_envelope(envelope: CommandEnvelope) -> Result<Self> {
        if envelope.tag != Self::TAG {
            return Err(GridError::UnknownCommand(envelope.tag));
        }
        Ok(serde_json::from_value(envelope.payload)?)
    }
}

//! MapReduce Engine
//!
//! Distributed map-combine-reduce over grid caches.
//!
//! ## Core Concepts
//! - **User functions**: `Mapper`, `Reducer` (also used as combiner) and
//!   `Collator`, typed over the cache's key/value types.
//! - **Function shipping**: functions travel as `FunctionDescriptor`s and
//!   are rebuilt by name through the `FunctionRegistry` on the receiver.
//! - **Task Parts**: one map or reduce unit per target node, run in-process
//!   when the target is local and over the transport otherwise.
//! - **Coordinator**: `MapReduceTask` runs the phases, handles the
//!   intermediate cache, timeouts and failure wrapping.
//! - **Cancellation**: `TaskFuture::cancel` signals the parts in flight;
//!   nodes trip the matching token in their `CancellationService`.

pub mod cancellation;
pub mod functions;
pub mod future;
pub mod handlers;
pub mod lifecycle;
pub mod manager;
pub mod part;
pub mod task;
pub mod types;

#[cfg(test)]
mod tests;

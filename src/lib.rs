//! Distributed MapReduce Data Grid Library
//!
//! This library crate defines the modules of a data-grid node able to run
//! map-combine-reduce tasks over its caches. It is the foundation for the
//! binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`cluster`**: member addresses, RPC options and the `Transport` used to
//!   ship commands (HTTP in production, in-process for tests).
//! - **`commands`**: serializable commands and the registry that dispatches
//!   them on the receiving node.
//! - **`storage`**: partitioned, replicated in-memory caches and the cache
//!   manager that creates and removes them.
//! - **`mapreduce`**: the task coordinator, task parts, node-side execution
//!   and cancellation.
//! - **`security`**: permission checks guarding task execution.
//! - **`node`**: `GridNode`, wiring all of the above for one member.
//! - **`config`** / **`error`**: node settings and the library error types.
//! - **`wordcount`**: the word-count job used by the HTTP endpoint.

pub mod cluster;
pub mod commands;
pub mod config;
pub mod error;
pub mod mapreduce;
pub mod node;
pub mod security;
pub mod storage;
pub mod wordcount;

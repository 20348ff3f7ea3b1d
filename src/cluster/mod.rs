//! Cluster Communication Module
//!
//! Everything the MapReduce engine needs from the cluster: member addresses,
//! RPC options and the `Transport` used to ship commands between nodes.
//!
//! ## Submodules
//! - **`types`**: `Address`, `RpcOptions`, `Response` and response unwrapping.
//! - **`transport`**: the `Transport` trait plus broadcast / in-future helpers.
//! - **`http`**: production transport (reqwest client, JSON over HTTP).
//! - **`simulated`**: in-process cluster used by tests and embedded setups.
//! - **`handlers`** / **`protocol`**: the axum endpoint receiving commands.

pub mod handlers;
pub mod http;
pub mod protocol;
pub mod simulated;
pub mod transport;
pub mod types;

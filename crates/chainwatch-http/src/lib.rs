//! chainwatch-http — JSON-RPC reference slot source for ChainWatch.
//!
//! [`HttpSlotClient`] answers `getSlot` for the drift monitor, retrying
//! transient HTTP failures with the core retry policy.

pub mod client;
pub mod rpc;

pub use client::{HttpClientConfig, HttpSlotClient};
pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

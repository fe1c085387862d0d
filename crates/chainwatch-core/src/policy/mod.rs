//! Reconnect and request retry policies.

pub mod retry;

pub use retry::{RetryConfig, RetryPolicy};

//! chainwatch-ws — WebSocket push-stream source for ChainWatch.
//!
//! # Features
//! - One WebSocket connection per [`chainwatch_core::Session`]
//! - `x-token` authentication header
//! - Inbound message size cap (64 MiB by default)
//! - JSON subscribe request out, JSON subscribe updates in
//! - WebSocket and application-level keep-alive replies
//!
//! Reconnection is not handled here: the `StreamWatcher` calls
//! [`WsStreamSource::subscribe`] again after a session ends.

pub mod decode;
pub mod source;

pub use decode::decode_update;
pub use source::{stream_url, WsSession, WsStreamSource};

//! chainwatch-core — stream resilience and drift detection for ChainWatch.
//!
//! # Overview
//!
//! ChainWatch keeps a push subscription to a node's slot stream alive forever
//! and, next to it, polls an independent JSON-RPC reference to tell whether
//! the stream is falling behind. The core crate defines:
//!
//! - [`StreamWatcher`] — self-restarting subscription loop
//! - [`DriftMonitor`] — periodic reference poll + drift verdict
//! - [`SharedMarker`] — the one piece of state the two loops share
//! - [`StreamSource`] / [`Session`] / [`SlotSource`] — transport seams
//! - [`policy`] module — reconnect retry policy
//! - [`WatchConfig`] — process configuration
//!
//! ```text
//! StreamSource ──► StreamWatcher ──write──► SharedMarker ◄──read── DriftMonitor ◄── SlotSource
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod marker;
pub mod monitor;
pub mod policy;
pub mod shutdown;
pub mod source;
pub mod subscribe;
pub mod watcher;

pub use config::{AccountFilter, ConfigError, LogConfig, WatchConfig};
pub use error::WatchError;
pub use event::{CommitmentLevel, SessionEnd, StreamEvent};
pub use marker::SharedMarker;
pub use monitor::{DriftMonitor, DriftStatus};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use source::{PayloadHandler, Session, SessionItem, SlotSource, StreamSource};
pub use subscribe::SubscribeRequest;
pub use watcher::{SessionState, StreamWatcher, WatcherStats};

//! Transport seams: the push stream, its sessions, and the polled reference.
//!
//! Implementations must be `Send + Sync` for use across Tokio tasks and are
//! stored as trait objects (`Arc<dyn StreamSource>`, `Arc<dyn SlotSource>`).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::WatchError;
use crate::event::{CommitmentLevel, SessionEnd, StreamEvent};
use crate::subscribe::SubscribeRequest;

/// One item pulled from a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionItem {
    Event(StreamEvent),
    /// The session is over; no further items follow.
    End(SessionEnd),
}

/// A single live subscription attempt.
#[async_trait]
pub trait Session: Send {
    /// Write the subscribe request. Called once per session.
    async fn send_request(&mut self, request: &SubscribeRequest) -> Result<(), WatchError>;

    /// Wait for the next event or the termination signal.
    async fn next_item(&mut self) -> SessionItem;
}

/// Something that can open stream sessions.
#[async_trait]
pub trait StreamSource: Send + Sync + 'static {
    /// Endpoint identifier used in logs.
    fn endpoint(&self) -> &str;

    /// Open a new session.
    async fn subscribe(&self) -> Result<Box<dyn Session>, WatchError>;
}

/// The polled reference for the current slot.
#[async_trait]
pub trait SlotSource: Send + Sync + 'static {
    fn endpoint(&self) -> &str;

    /// Latest slot known to the reference at `commitment`.
    async fn current_slot(&self, commitment: CommitmentLevel) -> Result<u64, WatchError>;
}

/// Receives transaction payloads; what it does with them is up to the caller.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn on_transaction(&self, slot: u64, payload: &Value);
}

//! Stream event model and commitment levels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Consistency level for slot data, shared by the stream filter and the
/// reference poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    /// Most recent, may be rolled back.
    #[default]
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
}

impl CommitmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommitmentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown commitment level '{other}'")),
        }
    }
}

/// A decoded update received on a stream session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The node advanced (or reported status for) a slot.
    SlotUpdate {
        slot: u64,
        parent: Option<u64>,
        status: Option<String>,
    },
    /// A transaction matching the subscription filter. The payload is opaque.
    Transaction { slot: u64, payload: Value },
    /// Server keep-alive.
    Ping,
    /// Any other update kind (accounts, entries, blocks...).
    Other,
}

impl StreamEvent {
    /// Slot marker to publish, if this event is a slot update.
    ///
    /// Transaction slots are deliberately not markers: only slot updates
    /// move the shared marker.
    pub fn marker(&self) -> Option<u64> {
        match self {
            Self::SlotUpdate { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

/// How a stream session terminated. Recovery is identical for all three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Transport error.
    Error(String),
    /// The server finished the stream.
    Ended,
    /// The connection was closed.
    Closed,
}

impl SessionEnd {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::Ended => "ended",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(reason) => write!(f, "stream error: {reason}"),
            Self::Ended => write!(f, "stream ended"),
            Self::Closed => write!(f, "stream closed"),
        }
    }
}

//! Error types shared by the watcher, the monitor and their transports.

use thiserror::Error;

/// Errors raised by stream sessions and reference polls.
///
/// None of these escape the two top-level loops: the watcher turns them into
/// a reconnect, the monitor into an "unknown" health cycle.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The stream endpoint could not be reached or refused the handshake.
    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// Writing the subscribe request to an established session failed.
    #[error("Failed to send subscribe request: {0}")]
    Send(String),

    /// The stream transport failed mid-session.
    #[error("Stream error: {0}")]
    Stream(String),

    /// An inbound update could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// HTTP request to the reference failed (connection refused, bad status...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error object returned by the reference node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The retry policy gave up reconnecting.
    #[error("Gave up after {attempts} consecutive failed attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Stream(_) | Self::Http(_) | Self::Timeout { .. }
        )
    }
}

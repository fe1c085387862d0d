//! `WsStreamSource` opens one WebSocket connection per stream session.
//!
//! # Usage
//! ```no_run
//! use chainwatch_ws::{stream_url, WsStreamSource};
//! use std::sync::Arc;
//!
//! let source = Arc::new(WsStreamSource::new(
//!     stream_url("https://example.rpcpool.com/"),
//!     "YOUR_TOKEN",
//! ));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use chainwatch_core::config::DEFAULT_MAX_MESSAGE_BYTES;
use chainwatch_core::{
    Session, SessionEnd, SessionItem, StreamEvent, StreamSource, SubscribeRequest, WatchError,
};

use crate::decode::decode_update;

/// Handshake header carrying the access token.
pub const TOKEN_HEADER: &str = "x-token";

/// Map an `http(s)://` node endpoint to its `ws(s)://` form. Other schemes
/// pass through unchanged.
pub fn stream_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

/// WebSocket stream source.
pub struct WsStreamSource {
    url: String,
    token: String,
    max_message_bytes: usize,
    connected: Arc<AtomicBool>,
}

impl WsStreamSource {
    /// `url` must be a `ws://` or `wss://` URL; an empty `token` sends no
    /// auth header.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Returns `true` while a session is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn connect_error(&self, reason: impl ToString) -> WatchError {
        WatchError::Connect {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl StreamSource for WsStreamSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn subscribe(&self) -> Result<Box<dyn Session>, WatchError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| self.connect_error(e))?;
        if !self.token.is_empty() {
            let token = HeaderValue::from_str(&self.token).map_err(|e| self.connect_error(e))?;
            request.headers_mut().insert(TOKEN_HEADER, token);
        }

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_bytes);
        config.max_frame_size = Some(self.max_message_bytes);

        debug!(url = %self.url, "opening WebSocket");
        let (ws, _response) = connect_async_with_config(request, Some(config), false)
            .await
            .map_err(|e| self.connect_error(e))?;

        self.connected.store(true, Ordering::Relaxed);
        info!(url = %self.url, "WebSocket connected");

        Ok(Box::new(WsSession {
            ws,
            connected: Arc::clone(&self.connected),
            pings: 0,
        }))
    }
}

/// A live WebSocket session. Dropping it closes the socket.
pub struct WsSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connected: Arc<AtomicBool>,
    pings: i32,
}

impl WsSession {
    fn end(&self, end: SessionEnd) -> SessionItem {
        self.connected.store(false, Ordering::Relaxed);
        SessionItem::End(end)
    }

    async fn send_json(&mut self, request: &SubscribeRequest) -> Result<(), WatchError> {
        let body = serde_json::to_string(request)?;
        self.ws
            .send(Message::Text(body))
            .await
            .map_err(|e| WatchError::Send(e.to_string()))
    }
}

#[async_trait]
impl Session for WsSession {
    async fn send_request(&mut self, request: &SubscribeRequest) -> Result<(), WatchError> {
        self.send_json(request).await
    }

    async fn next_item(&mut self) -> SessionItem {
        loop {
            let frame = match self.ws.next().await {
                None => return self.end(SessionEnd::Ended),
                Some(Err(e)) => return self.end(SessionEnd::Error(e.to_string())),
                Some(Ok(frame)) => frame,
            };

            let decoded = match frame {
                Message::Text(text) => decode_update(text.as_bytes()),
                Message::Binary(bytes) => decode_update(&bytes),
                Message::Ping(data) => {
                    // Respond to server pings to keep the connection alive
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return self.end(SessionEnd::Error(e.to_string()));
                    }
                    continue;
                }
                Message::Close(frame) => {
                    debug!(?frame, "WebSocket closed by server");
                    return self.end(SessionEnd::Closed);
                }
                Message::Pong(_) | Message::Frame(_) => continue,
            };

            match decoded {
                Ok(Some(StreamEvent::Ping)) => {
                    self.pings = self.pings.wrapping_add(1);
                    let reply = SubscribeRequest::ping(self.pings);
                    if let Err(e) = self.send_json(&reply).await {
                        return self.end(SessionEnd::Error(e.to_string()));
                    }
                    return SessionItem::Event(StreamEvent::Ping);
                }
                Ok(Some(event)) => return SessionItem::Event(event),
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "skipping undecodable update");
                    continue;
                }
            }
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

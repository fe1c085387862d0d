//! `StreamWatcher` keeps one logical stream subscription alive forever.
//!
//! # Session lifecycle
//! ```text
//! Connecting ──subscribe + send request──► Subscribed ──error/end/close──► Terminated
//!     ▲                                                                       │
//!     └──────────────────────── retry policy delay ◄──────────────────────────┘
//! ```
//! A failed connect or request write goes straight to `Terminated`. Every
//! termination is handled the same way: wait, then reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::error::WatchError;
use crate::event::{SessionEnd, StreamEvent};
use crate::marker::SharedMarker;
use crate::policy::RetryPolicy;
use crate::shutdown::Shutdown;
use crate::source::{PayloadHandler, Session, SessionItem, StreamSource};
use crate::subscribe::SubscribeRequest;

/// Observable state of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Opening a session; `attempt` counts consecutive attempts since the
    /// last established session.
    Connecting { attempt: u32 },
    /// Subscribe request accepted, events flowing.
    Subscribed,
    /// The session is over and a reconnect is pending.
    Terminated(SessionEnd),
}

/// Counters snapshot for the watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub send_failures: u64,
    pub sessions_established: u64,
    pub events: u64,
    pub markers_written: u64,
    pub stream_errors: u64,
    pub stream_ends: u64,
    pub stream_closes: u64,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    send_failures: AtomicU64,
    sessions_established: AtomicU64,
    events: AtomicU64,
    markers_written: AtomicU64,
    stream_errors: AtomicU64,
    stream_ends: AtomicU64,
    stream_closes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            markers_written: self.markers_written.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            stream_ends: self.stream_ends.load(Ordering::Relaxed),
            stream_closes: self.stream_closes.load(Ordering::Relaxed),
        }
    }
}

enum Outcome {
    /// The session was subscribed before it terminated.
    Established,
    /// Connect or request write failed.
    Failed,
}

/// Self-restarting subscription loop. Sole writer of the [`SharedMarker`].
pub struct StreamWatcher {
    source: Arc<dyn StreamSource>,
    request: SubscribeRequest,
    marker: SharedMarker,
    retry: RetryPolicy,
    payload_handler: Option<Arc<dyn PayloadHandler>>,
    state: watch::Sender<SessionState>,
    counters: Counters,
}

impl StreamWatcher {
    /// Create a watcher with the default fixed 5 s reconnect policy.
    pub fn new(source: Arc<dyn StreamSource>, request: SubscribeRequest, marker: SharedMarker) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting { attempt: 1 });
        Self {
            source,
            request,
            marker,
            retry: RetryPolicy::default(),
            payload_handler: None,
            state,
            counters: Counters::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Forward transaction payloads to `handler`.
    pub fn with_payload_handler(mut self, handler: Arc<dyn PayloadHandler>) -> Self {
        self.payload_handler = Some(handler);
        self
    }

    /// Follow session state transitions.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> WatcherStats {
        self.counters.snapshot()
    }

    /// Run until `shutdown` fires.
    ///
    /// Only returns an error if the retry policy has a `max_retries` cap and
    /// it is exhausted; with the default policy this loops forever.
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<(), WatchError> {
        let mut failures = 0u32;

        while !shutdown.is_triggered() {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                outcome = self.run_session(failures + 1) => outcome,
            };

            // The cap counts consecutive failures only; a session that
            // subscribed always earns a reconnect.
            let delay = match outcome {
                Outcome::Established => {
                    failures = 0;
                    self.retry.config.interval
                }
                Outcome::Failed => {
                    failures = failures.saturating_add(1);
                    match self.retry.next_delay(failures) {
                        Some(delay) => delay,
                        None => {
                            error!(attempts = failures, endpoint = self.source.endpoint(), "giving up on stream");
                            return Err(WatchError::RetriesExhausted { attempts: failures });
                        }
                    }
                }
            };

            info!(delay_ms = delay.as_millis() as u64, "reconnecting in {delay:?}");
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(endpoint = self.source.endpoint(), "stream watcher stopped");
        Ok(())
    }

    async fn run_session(&self, attempt: u32) -> Outcome {
        self.state.send_replace(SessionState::Connecting { attempt });
        Counters::bump(&self.counters.connect_attempts);
        info!(endpoint = self.source.endpoint(), attempt, "connecting to stream");

        let mut session = match self.source.subscribe().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "connection error");
                Counters::bump(&self.counters.connect_failures);
                self.state.send_replace(SessionState::Terminated(SessionEnd::Error(e.to_string())));
                return Outcome::Failed;
            }
        };

        if let Err(e) = session.send_request(&self.request).await {
            error!(error = %e, "failed to send subscribe request");
            Counters::bump(&self.counters.send_failures);
            self.state.send_replace(SessionState::Terminated(SessionEnd::Error(e.to_string())));
            return Outcome::Failed;
        }

        Counters::bump(&self.counters.sessions_established);
        self.state.send_replace(SessionState::Subscribed);
        info!(endpoint = self.source.endpoint(), "subscribed");

        let end = self.drain(session.as_mut()).await;
        match &end {
            SessionEnd::Error(reason) => {
                Counters::bump(&self.counters.stream_errors);
                warn!(%reason, "stream error");
            }
            SessionEnd::Ended => {
                Counters::bump(&self.counters.stream_ends);
                info!("stream ended");
            }
            SessionEnd::Closed => {
                Counters::bump(&self.counters.stream_closes);
                info!("stream closed");
            }
        }
        self.state.send_replace(SessionState::Terminated(end));
        Outcome::Established
    }

    /// Consume events until the session terminates.
    async fn drain(&self, session: &mut dyn Session) -> SessionEnd {
        loop {
            match session.next_item().await {
                SessionItem::Event(event) => self.handle_event(event).await,
                SessionItem::End(end) => return end,
            }
        }
    }

    async fn handle_event(&self, event: StreamEvent) {
        Counters::bump(&self.counters.events);

        if let Some(slot) = event.marker() {
            if let Some(prev) = self.marker.set(slot) {
                if slot < prev {
                    debug!(prev, slot, "slot marker moved backwards");
                }
            }
            Counters::bump(&self.counters.markers_written);
            trace!(slot, "slot update");
            return;
        }

        if let StreamEvent::Transaction { slot, payload } = event {
            if let Some(handler) = &self.payload_handler {
                handler.on_transaction(slot, &payload).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted(VecDeque<SessionItem>);

    #[async_trait]
    impl Session for Scripted {
        async fn send_request(&mut self, _request: &SubscribeRequest) -> Result<(), WatchError> {
            Ok(())
        }

        async fn next_item(&mut self) -> SessionItem {
            self.0.pop_front().unwrap_or(SessionItem::End(SessionEnd::Ended))
        }
    }

    struct OneSession(Mutex<Option<Vec<SessionItem>>>);

    #[async_trait]
    impl StreamSource for OneSession {
        fn endpoint(&self) -> &str {
            "mock://one"
        }

        async fn subscribe(&self) -> Result<Box<dyn Session>, WatchError> {
            match self.0.lock().unwrap().take() {
                Some(items) => Ok(Box::new(Scripted(items.into()))),
                None => Err(WatchError::Other("exhausted".into())),
            }
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    #[async_trait]
    impl PayloadHandler for Collect {
        async fn on_transaction(&self, slot: u64, _payload: &serde_json::Value) {
            self.0.lock().unwrap().push(slot);
        }
    }

    fn slot(n: u64) -> SessionItem {
        SessionItem::Event(StreamEvent::SlotUpdate { slot: n, parent: None, status: None })
    }

    #[tokio::test]
    async fn session_writes_marker_and_forwards_transactions() {
        let items = vec![
            slot(10),
            SessionItem::Event(StreamEvent::Transaction { slot: 11, payload: serde_json::json!({}) }),
            slot(12),
            SessionItem::Event(StreamEvent::Ping),
            SessionItem::End(SessionEnd::Closed),
        ];
        let marker = SharedMarker::new();
        let handler = Arc::new(Collect::default());
        let watcher = StreamWatcher::new(
            Arc::new(OneSession(Mutex::new(Some(items)))),
            SubscribeRequest::default(),
            marker.clone(),
        )
        .with_payload_handler(handler.clone());

        assert!(matches!(watcher.run_session(1).await, Outcome::Established));
        assert_eq!(marker.get(), Some(12));
        assert_eq!(*handler.0.lock().unwrap(), vec![11]);
        assert_eq!(*watcher.state().borrow(), SessionState::Terminated(SessionEnd::Closed));

        let stats = watcher.stats();
        assert_eq!(stats.events, 4);
        assert_eq!(stats.markers_written, 2);
        assert_eq!(stats.stream_closes, 1);
    }

    /// Every session subscribes, then the server closes it.
    struct AlwaysCloses;

    #[async_trait]
    impl StreamSource for AlwaysCloses {
        fn endpoint(&self) -> &str {
            "mock://closes"
        }

        async fn subscribe(&self) -> Result<Box<dyn Session>, WatchError> {
            Ok(Box::new(Scripted(vec![SessionItem::End(SessionEnd::Closed)].into())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_ignores_established_sessions() {
        let watcher = Arc::new(
            StreamWatcher::new(Arc::new(AlwaysCloses), SubscribeRequest::default(), SharedMarker::new())
                .with_retry_policy(RetryPolicy::new(
                    crate::policy::RetryConfig::fixed(std::time::Duration::from_secs(1)).with_max_retries(0),
                )),
        );

        let (trigger, signal) = crate::shutdown::channel();
        let task = tokio::spawn({
            let watcher = watcher.clone();
            async move { watcher.run(signal).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(3_500)).await;
        trigger.trigger();
        task.await.unwrap().unwrap();

        let stats = watcher.stats();
        assert_eq!(stats.connect_failures, 0);
        assert_eq!(stats.sessions_established, 4);
        assert_eq!(stats.stream_closes, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_retries_capped() {
        let watcher = StreamWatcher::new(
            Arc::new(OneSession(Mutex::new(None))),
            SubscribeRequest::default(),
            SharedMarker::new(),
        )
        .with_retry_policy(RetryPolicy::new(
            crate::policy::RetryConfig::fixed(std::time::Duration::from_secs(1)).with_max_retries(2),
        ));

        let err = watcher.run(Shutdown::never()).await.unwrap_err();
        assert!(matches!(err, WatchError::RetriesExhausted { attempts: 3 }));
        assert_eq!(watcher.stats().connect_attempts, 3);
        assert_eq!(watcher.stats().connect_failures, 3);
    }
}

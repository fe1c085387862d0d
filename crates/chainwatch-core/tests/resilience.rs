//! Reconnect behaviour of `StreamWatcher` against a scripted stream source.
//!
//! All tests run on a paused Tokio clock, so the 5 s reconnect delay elapses
//! instantly while `Instant` arithmetic stays exact.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use chainwatch_core::policy::{RetryConfig, RetryPolicy};
use chainwatch_core::shutdown;
use chainwatch_core::{
    Session, SessionEnd, SessionItem, SessionState, SharedMarker, StreamEvent, StreamSource,
    StreamWatcher, SubscribeRequest, WatchError,
};

const INTERVAL: Duration = Duration::from_secs(5);

/// What the next call to `subscribe()` should do.
enum Script {
    ConnectFails,
    SendFails(Vec<SessionItem>),
    Runs(Vec<SessionItem>),
}

#[derive(Default)]
struct Recorder {
    connects: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<SubscribeRequest>>,
    reads_after_failed_send: AtomicUsize,
}

struct FakeSource {
    script: Mutex<VecDeque<Script>>,
    recorder: Arc<Recorder>,
}

impl FakeSource {
    fn new(script: Vec<Script>) -> (Arc<Self>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let source = Arc::new(Self {
            script: Mutex::new(script.into()),
            recorder: recorder.clone(),
        });
        (source, recorder)
    }
}

struct FakeSession {
    items: VecDeque<SessionItem>,
    fail_send: bool,
    send_failed: bool,
    /// Once the script is spent the last session idles forever.
    idle: bool,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Session for FakeSession {
    async fn send_request(&mut self, request: &SubscribeRequest) -> Result<(), WatchError> {
        self.recorder.requests.lock().unwrap().push(request.clone());
        if self.fail_send {
            self.send_failed = true;
            return Err(WatchError::Send("broken pipe".into()));
        }
        Ok(())
    }

    async fn next_item(&mut self) -> SessionItem {
        if self.send_failed {
            self.recorder.reads_after_failed_send.fetch_add(1, Ordering::SeqCst);
        }
        if self.idle {
            return futures::future::pending().await;
        }
        self.items
            .pop_front()
            .unwrap_or(SessionItem::End(SessionEnd::Ended))
    }
}

#[async_trait]
impl StreamSource for FakeSource {
    fn endpoint(&self) -> &str {
        "fake://stream"
    }

    async fn subscribe(&self) -> Result<Box<dyn Session>, WatchError> {
        self.recorder.connects.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        let session = |items: Vec<SessionItem>, fail_send, idle| FakeSession {
            items: items.into(),
            fail_send,
            send_failed: false,
            idle,
            recorder: self.recorder.clone(),
        };
        match next {
            Some(Script::ConnectFails) => Err(WatchError::Connect {
                url: "fake://stream".into(),
                reason: "connection refused".into(),
            }),
            Some(Script::SendFails(items)) => Ok(Box::new(session(items, true, false))),
            Some(Script::Runs(items)) => Ok(Box::new(session(items, false, false))),
            None => Ok(Box::new(session(vec![], false, true))),
        }
    }
}

fn slot(n: u64) -> SessionItem {
    SessionItem::Event(StreamEvent::SlotUpdate { slot: n, parent: None, status: None })
}

fn tx(n: u64) -> SessionItem {
    SessionItem::Event(StreamEvent::Transaction {
        slot: n,
        payload: serde_json::json!({ "signature": format!("sig{n}") }),
    })
}

fn watcher(source: Arc<FakeSource>, marker: SharedMarker) -> Arc<StreamWatcher> {
    Arc::new(
        StreamWatcher::new(source, SubscribeRequest::ping(7), marker)
            .with_retry_policy(RetryPolicy::new(RetryConfig::fixed(INTERVAL))),
    )
}

fn assert_spacing(connects: &[Instant], at_least: Duration) {
    for pair in connects.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= at_least, "reconnected after {gap:?}, expected >= {at_least:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_every_kind_of_termination() {
    let terminations = vec![
        Script::Runs(vec![SessionItem::End(SessionEnd::Error("reset by peer".into()))]),
        Script::Runs(vec![SessionItem::End(SessionEnd::Ended)]),
        Script::Runs(vec![SessionItem::End(SessionEnd::Closed)]),
        Script::ConnectFails,
        Script::SendFails(vec![]),
        Script::Runs(vec![SessionItem::End(SessionEnd::Closed)]),
    ];
    let n = terminations.len();
    let (source, recorder) = FakeSource::new(terminations);
    let watcher = watcher(source, SharedMarker::new());

    let (trigger, signal) = shutdown::channel();
    let task = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(signal).await }
    });

    tokio::time::sleep(INTERVAL * (n as u32 + 2)).await;

    let connects = recorder.connects.lock().unwrap().clone();
    assert_eq!(connects.len(), n + 1, "N terminations must lead to N+1 attempts");
    assert_spacing(&connects, INTERVAL);

    let stats = watcher.stats();
    assert_eq!(stats.stream_errors, 1);
    assert_eq!(stats.stream_ends, 1);
    assert_eq!(stats.stream_closes, 2);
    assert_eq!(stats.connect_failures, 1);
    assert_eq!(stats.send_failures, 1);
    assert_eq!(*watcher.state().borrow(), SessionState::Subscribed);

    // every session that connected got the same request
    let requests = recorder.requests.lock().unwrap();
    assert_eq!(requests.len(), n);
    assert!(requests.iter().all(|r| *r == SubscribeRequest::ping(7)));
    drop(requests);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn slot_update_then_close_publishes_marker_and_reconnects() {
    let (source, recorder) = FakeSource::new(vec![Script::Runs(vec![
        slot(100),
        SessionItem::End(SessionEnd::Closed),
    ])]);
    let marker = SharedMarker::new();
    let watcher = watcher(source, marker.clone());

    let (trigger, signal) = shutdown::channel();
    let task = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(signal).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(marker.get(), Some(100));
    assert_eq!(recorder.connects.lock().unwrap().len(), 1);

    tokio::time::sleep(INTERVAL).await;
    let connects = recorder.connects.lock().unwrap().clone();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1] - connects[0], INTERVAL);
    assert_eq!(marker.get(), Some(100));

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_request_write_tears_down_session_without_reading() {
    let (source, recorder) = FakeSource::new(vec![Script::SendFails(vec![slot(5), slot(6)])]);
    let marker = SharedMarker::new();
    let watcher = watcher(source, marker.clone());

    let (trigger, signal) = shutdown::channel();
    let task = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(signal).await }
    });

    tokio::time::sleep(INTERVAL * 2).await;

    assert_eq!(marker.get(), None);
    assert_eq!(recorder.reads_after_failed_send.load(Ordering::SeqCst), 0);
    let connects = recorder.connects.lock().unwrap().clone();
    assert_eq!(connects.len(), 2);
    assert!(connects[1] - connects[0] >= INTERVAL);
    assert_eq!(watcher.stats().sessions_established, 1);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn marker_tracks_latest_slot_update_across_sessions() {
    let (source, _recorder) = FakeSource::new(vec![
        Script::Runs(vec![slot(10), tx(11), slot(12), tx(13), SessionItem::End(SessionEnd::Ended)]),
        Script::Runs(vec![tx(20), slot(15), tx(21)]),
    ]);
    let marker = SharedMarker::new();
    let watcher = watcher(source, marker.clone());

    let (trigger, signal) = shutdown::channel();
    let task = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(signal).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(marker.get(), Some(12));

    tokio::time::sleep(INTERVAL).await;
    // lower slot after a higher one still overwrites
    assert_eq!(marker.get(), Some(15));
    assert_eq!(watcher.stats().markers_written, 3);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_reconnect_delay() {
    let (source, recorder) = FakeSource::new(vec![Script::ConnectFails]);
    let watcher = watcher(source, SharedMarker::new());

    let (trigger, signal) = shutdown::channel();
    let task = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(signal).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let started = Instant::now();
    trigger.trigger();
    task.await.unwrap().unwrap();

    assert!(Instant::now() - started < INTERVAL);
    assert_eq!(recorder.connects.lock().unwrap().len(), 1);
}

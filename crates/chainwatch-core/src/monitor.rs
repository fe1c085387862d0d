//! `DriftMonitor` compares the stream's slot marker with a polled reference.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::event::CommitmentLevel;
use crate::marker::SharedMarker;
use crate::shutdown::Shutdown;
use crate::source::SlotSource;

/// Default delay between two reference polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Verdict of one monitor cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftStatus {
    /// Stream marker is at or ahead of the reference.
    Healthy { marker: u64, reference: u64 },
    /// Stream marker trails the reference by `behind` slots.
    Lagging { marker: u64, reference: u64, behind: u64 },
    /// No slot has been observed on the stream yet.
    WarmingUp { reference: u64 },
    /// The reference poll failed; nothing can be said this cycle.
    Unknown { reason: String },
}

impl DriftStatus {
    /// Compare a (possibly unset) stream marker with a reference slot.
    pub fn evaluate(marker: Option<u64>, reference: u64) -> Self {
        match marker {
            None => Self::WarmingUp { reference },
            Some(marker) if marker < reference => Self::Lagging {
                marker,
                reference,
                behind: reference - marker,
            },
            Some(marker) => Self::Healthy { marker, reference },
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }

    /// Slots behind the reference, when lagging.
    pub fn lag(&self) -> Option<u64> {
        match self {
            Self::Lagging { behind, .. } => Some(*behind),
            _ => None,
        }
    }
}

impl std::fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy { .. } => write!(f, "healthy"),
            Self::Lagging { behind, .. } => write!(f, "lagging by {behind}"),
            Self::WarmingUp { .. } => write!(f, "warming up"),
            Self::Unknown { .. } => write!(f, "health unknown"),
        }
    }
}

/// Periodic drift check. Sole reader of the [`SharedMarker`].
pub struct DriftMonitor {
    source: Arc<dyn SlotSource>,
    marker: SharedMarker,
    commitment: CommitmentLevel,
    interval: Duration,
    status: watch::Sender<Option<DriftStatus>>,
}

impl DriftMonitor {
    pub fn new(source: Arc<dyn SlotSource>, marker: SharedMarker) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            source,
            marker,
            commitment: CommitmentLevel::Processed,
            interval: DEFAULT_POLL_INTERVAL,
            status,
        }
    }

    pub fn with_commitment(mut self, commitment: CommitmentLevel) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Latest verdict, `None` before the first cycle completes.
    pub fn subscribe(&self) -> watch::Receiver<Option<DriftStatus>> {
        self.status.subscribe()
    }

    /// One poll-and-compare cycle. Never fails: a poll error becomes
    /// [`DriftStatus::Unknown`].
    pub async fn check_once(&self) -> DriftStatus {
        let status = match self.source.current_slot(self.commitment).await {
            Ok(reference) => DriftStatus::evaluate(self.marker.get(), reference),
            Err(e) => DriftStatus::Unknown { reason: e.to_string() },
        };
        report(&status);
        self.status.send_replace(Some(status.clone()));
        status
    }

    /// Run until `shutdown` fires.
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!(
            endpoint = self.source.endpoint(),
            commitment = %self.commitment,
            interval_ms = self.interval.as_millis() as u64,
            "drift monitor started"
        );
        while !shutdown.is_triggered() {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = self.check_once() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("drift monitor stopped");
    }
}

fn report(status: &DriftStatus) {
    match status {
        DriftStatus::Healthy { marker, reference } => {
            info!(marker, reference, ahead = marker - reference, "stream is healthy");
        }
        DriftStatus::Lagging { marker, reference, behind } => {
            warn!(marker, reference, behind, "stream is lagging by {behind} slots");
        }
        DriftStatus::WarmingUp { reference } => {
            info!(reference, "warming up: no slot observed on the stream yet");
        }
        DriftStatus::Unknown { reason } => {
            warn!(%reason, "health unknown: reference poll failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_lagging_reports_gap() {
        let status = DriftStatus::evaluate(Some(50), 80);
        assert_eq!(status, DriftStatus::Lagging { marker: 50, reference: 80, behind: 30 });
        assert_eq!(status.lag(), Some(30));
        assert_eq!(status.to_string(), "lagging by 30");
    }

    #[test]
    fn evaluate_equal_or_ahead_is_healthy() {
        assert!(DriftStatus::evaluate(Some(80), 80).is_healthy());
        assert!(DriftStatus::evaluate(Some(90), 80).is_healthy());
    }

    #[test]
    fn evaluate_unset_marker_is_warming_up() {
        let status = DriftStatus::evaluate(None, 80);
        assert_eq!(status, DriftStatus::WarmingUp { reference: 80 });
        assert!(!status.is_healthy());
        assert_eq!(status.lag(), None);
    }
}

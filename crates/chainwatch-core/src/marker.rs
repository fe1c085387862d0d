//! The slot marker shared between the stream watcher and the drift monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reserved value meaning "no slot observed yet".
const UNSET: u64 = u64::MAX;

/// Latest slot observed on the push stream.
///
/// Cloning hands out another handle to the same cell. The watcher is the only
/// writer and the monitor the only reader; writes are last-write-wins, so a
/// lower slot delivered after a higher one overwrites it.
#[derive(Debug, Clone)]
pub struct SharedMarker {
    slot: Arc<AtomicU64>,
}

impl SharedMarker {
    /// Create a marker in the "unknown" state.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(AtomicU64::new(UNSET)),
        }
    }

    /// Store `slot`, returning the previously stored value if any.
    pub fn set(&self, slot: u64) -> Option<u64> {
        let prev = self.slot.swap(slot.min(UNSET - 1), Ordering::AcqRel);
        (prev != UNSET).then_some(prev)
    }

    /// Current slot, or `None` before the first update.
    pub fn get(&self) -> Option<u64> {
        let slot = self.slot.load(Ordering::Acquire);
        (slot != UNSET).then_some(slot)
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

impl Default for SharedMarker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let marker = SharedMarker::new();
        assert_eq!(marker.get(), None);
        assert!(!marker.is_set());
    }

    #[test]
    fn last_write_wins() {
        let marker = SharedMarker::new();
        assert_eq!(marker.set(100), None);
        assert_eq!(marker.set(120), Some(100));
        // out-of-order delivery is not clamped
        assert_eq!(marker.set(110), Some(120));
        assert_eq!(marker.get(), Some(110));
    }

    #[test]
    fn clones_share_the_cell() {
        let writer = SharedMarker::new();
        let reader = writer.clone();
        writer.set(0);
        assert_eq!(reader.get(), Some(0));
    }

    #[test]
    fn concurrent_reader_never_sees_torn_values() {
        let marker = SharedMarker::new();
        let writer = marker.clone();
        let handle = std::thread::spawn(move || {
            for slot in 0..10_000u64 {
                writer.set(slot * 3);
            }
        });
        for _ in 0..10_000 {
            if let Some(slot) = marker.get() {
                assert_eq!(slot % 3, 0);
            }
        }
        handle.join().unwrap();
        assert_eq!(marker.get(), Some(9_999 * 3));
    }
}

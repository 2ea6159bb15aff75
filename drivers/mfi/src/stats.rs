//! Controller statistics

use core::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from submit, dispatch and reset paths
#[derive(Debug, Default)]
pub struct ControllerStats {
    /// Commands posted to the adapter
    pub submitted: AtomicU64,
    /// Commands completed with status OK
    pub completed: AtomicU64,
    /// Commands completed with a failure status or failed by a reset
    pub failed: AtomicU64,
    /// Reply entries that named no posted slot
    pub spurious: AtomicU64,
    /// Commands that outlived their TTL
    pub timeouts: AtomicU64,
    /// Adapter resets started
    pub resets: AtomicU64,
}

impl ControllerStats {
    /// Create zeroed counters
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            spurious: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_completion(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_spurious(&self) {
        self.spurious.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            spurious: self.spurious.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ControllerStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Commands posted to the adapter
    pub submitted: u64,
    /// Commands completed with success
    pub completed: u64,
    /// Commands completed with an error, adapter or synthetic
    pub failed: u64,
    /// Reply entries that matched no posted slot
    pub spurious: u64,
    /// Commands that outlived their TTL
    pub timeouts: u64,
    /// Adapter resets started
    pub resets: u64,
}

impl StatsSnapshot {
    /// Commands posted and not yet completed or failed
    pub fn outstanding(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

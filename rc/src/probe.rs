//! Critical-section instrumentation
//!
//! Counts how many relays are in their Executing phase at once. The chain is
//! correct only if the peak never exceeds one, whatever the interleaving.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

/// Thread-safe counters around the Executing phase
#[derive(Debug, Default)]
pub struct ExecutionProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    entries: AtomicU64,
}

/// Marks one relay as executing until dropped
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    probe: &'a ExecutionProbe,
}

impl ExecutionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entry into the Executing phase
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entries.fetch_add(1, Ordering::Relaxed);
        if now > 1 {
            debug!(active = now, "ExecutionProbe::enter: overlapping execution");
        }
        ProbeGuard { probe: self }
    }

    /// Relays executing right now
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of relays ever executing together
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total number of Executing phases entered
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_entries_peak_one() {
        let probe = ExecutionProbe::new();
        for _ in 0..3 {
            let _guard = probe.enter();
            assert_eq!(probe.active(), 1);
        }
        assert_eq!(probe.active(), 0);
        assert_eq!(probe.peak(), 1);
        assert_eq!(probe.entries(), 3);
    }

    #[test]
    fn test_overlap_detected() {
        let probe = ExecutionProbe::new();
        let first = probe.enter();
        let second = probe.enter();
        assert_eq!(probe.peak(), 2);

        drop(first);
        drop(second);
        assert_eq!(probe.active(), 0);
    }
}

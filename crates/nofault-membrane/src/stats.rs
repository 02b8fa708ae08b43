//! Outcome counters for no-fault copies.
//!
//! Counters are relaxed atomics: recording never blocks, allocates or
//! performs I/O, so it is allowed on the no-fault path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for no-fault operations.
pub struct CopyStats {
    /// Operations entered (including no-ops).
    pub calls: AtomicU64,
    /// Operations with a non-positive limit.
    pub noops: AtomicU64,
    /// Strings delivered whole, fixed copies completed, terminators found.
    pub copied: AtomicU64,
    /// Strings cut at the limit, or length scans that hit their bound.
    pub truncated: AtomicU64,
    /// Sources that could not be read.
    pub faults: AtomicU64,
    /// Bytes handed to callers, terminators included.
    pub bytes_delivered: AtomicU64,
    /// Times `auto` fell back from process_vm_readv to the pipe reader.
    pub reader_fallbacks: AtomicU64,
}

/// Plain copy of [`CopyStats`] at one instant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub noops: u64,
    pub copied: u64,
    pub truncated: u64,
    pub faults: u64,
    pub bytes_delivered: u64,
    pub reader_fallbacks: u64,
}

impl CopyStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            noops: AtomicU64::new(0),
            copied: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            reader_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn record_noop(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.noops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_copied(&self, bytes: usize) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.copied.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_truncated(&self, bytes: usize) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.truncated.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.reader_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            noops: self.noops.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            reader_fallbacks: self.reader_fallbacks.load(Ordering::Relaxed),
        }
    }
}

impl Default for CopyStats {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_STATS: CopyStats = CopyStats::new();

/// Process-wide counters fed by every no-fault copy and length scan.
#[must_use]
pub fn global_stats() -> &'static CopyStats {
    &GLOBAL_STATS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_outcome() {
        let stats = CopyStats::new();
        stats.record_noop();
        stats.record_copied(3);
        stats.record_truncated(5);
        stats.record_fault();
        stats.record_fallback();

        let snap = stats.snapshot();
        assert_eq!(snap.calls, 4);
        assert_eq!(snap.noops, 1);
        assert_eq!(snap.copied, 1);
        assert_eq!(snap.truncated, 1);
        assert_eq!(snap.faults, 1);
        assert_eq!(snap.bytes_delivered, 8);
        assert_eq!(snap.reader_fallbacks, 1);
    }

    #[test]
    fn fresh_counters_are_zero() {
        assert_eq!(CopyStats::default().snapshot(), StatsSnapshot::default());
    }
}

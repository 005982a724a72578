use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounts {
    pub scan_ticks: u64,
    pub skipped_ticks: u64,
    pub published: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub duplicates_suppressed: u64,
}

/// Monotonic counters shared by the scanner, the consumers and the processor.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    scan_ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    published: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    duplicates_suppressed: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scan_tick(&self) {
        self.scan_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineCounts {
        PipelineCounts {
            scan_ticks: self.scan_ticks.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = PipelineCounters::new();
        counters.record_scan_tick();
        counters.record_published();
        counters.record_published();
        counters.record_acked();
        counters.record_dropped();

        let counts = counters.snapshot();
        assert_eq!(counts.scan_ticks, 1);
        assert_eq!(counts.published, 2);
        assert_eq!(counts.acked, 1);
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.requeued, 0);
    }
}

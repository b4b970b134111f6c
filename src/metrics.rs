use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Traffic counters for the durable store. The remote API budget is small
/// (~60 writes/minute), so operators watch these to see how close a shop
/// shift runs to the ceiling.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub revision_conflicts: AtomicU64,
    pub rate_limit_waits: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub revision_conflicts: u64,
    pub rate_limit_waits: u64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revision_conflict(&self) {
        self.revision_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// A write found the quota empty and had to wait for a slot.
    pub fn record_rate_limit_wait(&self) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            revision_conflicts: self.revision_conflicts.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            reads = stats.reads,
            writes = stats.writes,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            revision_conflicts = stats.revision_conflicts,
            rate_limit_waits = stats.rate_limit_waits,
            "record store traffic"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = StoreMetrics::new();
        metrics.record_read();
        metrics.record_read();
        metrics.record_write();
        metrics.record_revision_conflict();
        metrics.record_rate_limit_wait();

        let stats = metrics.stats();
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.revision_conflicts, 1);
        assert_eq!(stats.rate_limit_waits, 1);
    }
}

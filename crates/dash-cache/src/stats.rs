//! Store-level statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by a cache store
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    hits: AtomicU64,
    /// Number of cache misses
    misses: AtomicU64,
    /// Number of entries stored
    inserts: AtomicU64,
    /// Entries dropped to honour a capacity or memory bound
    evictions: AtomicU64,
    /// Entries dropped because their TTL elapsed
    expirations: AtomicU64,
    /// Number of full clears
    clears: AtomicU64,
    /// Current number of entries
    entry_count: AtomicU64,
    /// Approximate memory usage in bytes
    memory_bytes: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries stored
    pub inserts: u64,
    /// Number of entries evicted
    pub evictions: u64,
    /// Number of entries expired by TTL
    pub expirations: u64,
    /// Number of full clears
    pub clears: u64,
    /// Current number of entries
    pub entry_count: u64,
    /// Approximate memory usage in bytes
    pub memory_bytes: u64,
}

impl CacheStatsSnapshot {
    /// Hit rate in `0.0..=1.0`; zero before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl CacheStats {
    /// Create new cache statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insert
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a TTL expiration
    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a full clear
    pub fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the store's current size
    pub fn set_size(&self, entries: usize, memory_bytes: usize) {
        self.entry_count.store(entries as u64, Ordering::Relaxed);
        self.memory_bytes.store(memory_bytes as u64, Ordering::Relaxed);
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get expiration count
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions(),
            expirations: self.expirations(),
            clears: self.clears.load(Ordering::Relaxed),
            entry_count: self.entry_count.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
        }
    }

    /// Reset the event counters; size gauges are left as they are.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_recording() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_insert();
        stats.set_size(1, 4096);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.lookups(), 3);
        assert_eq!(snapshot.inserts, 1);
        assert_eq!(snapshot.entry_count, 1);
        assert_eq!(snapshot.memory_bytes, 4096);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.record_hit();
        stats.record_miss();
        assert!((stats.snapshot().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_keeps_gauges() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_eviction();
        stats.set_size(3, 100);

        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.evictions, 0);
        assert_eq!(snapshot.entry_count, 3);
    }
}

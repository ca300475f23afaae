//! LRU result store with optional TTL and memory bounds

use crate::config::CacheConfig;
use crate::stats::CacheStats;
use crate::store::CacheStore;
use dash_core::{QueryIdentity, QueryResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry stored in the LRU
#[derive(Debug, Clone)]
struct CacheEntry {
    result: Arc<QueryResult>,
    created_at: Instant,
    size_bytes: usize,
    hit_count: u64,
}

impl CacheEntry {
    fn new(result: Arc<QueryResult>) -> Self {
        let size_bytes = result.memory_usage();
        Self {
            result,
            created_at: Instant::now(),
            size_bytes,
            hit_count: 0,
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.map(|ttl| self.created_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

struct Inner {
    entries: LruCache<QueryIdentity, CacheEntry>,
    memory_used: usize,
}

impl Inner {
    fn remove(&mut self, identity: &QueryIdentity) -> Option<CacheEntry> {
        let entry = self.entries.pop(identity)?;
        self.memory_used = self.memory_used.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Store that evicts least recently used results when a capacity or memory
/// bound is reached, and treats results older than the TTL as absent.
pub struct LruStore {
    inner: Mutex<Inner>,
    config: CacheConfig,
    stats: Arc<CacheStats>,
}

impl LruStore {
    pub fn new(config: CacheConfig) -> Self {
        let entries = match config.max_entries.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            inner: Mutex::new(Inner {
                entries,
                memory_used: 0,
            }),
            config,
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Remove every entry whose TTL has elapsed, returning how many were removed.
    pub fn expire_stale(&self) -> usize {
        let ttl = self.config.ttl();
        if ttl.is_none() {
            return 0;
        }

        let (count, entries, memory) = {
            let mut inner = self.inner.lock();
            let expired: Vec<QueryIdentity> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(ttl))
                .map(|(key, _)| key.clone())
                .collect();

            for key in &expired {
                inner.remove(key);
                self.stats.record_expiration();
            }
            (expired.len(), inner.entries.len(), inner.memory_used)
        };

        self.stats.set_size(entries, memory);
        if count > 0 {
            tracing::debug!(count, "expired stale query results");
        }
        count
    }

    /// Times the cached result for `identity` has been served
    pub fn hit_count(&self, identity: &QueryIdentity) -> Option<u64> {
        self.inner.lock().entries.peek(identity).map(|e| e.hit_count)
    }
}

impl CacheStore for LruStore {
    fn get(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>> {
        let ttl = self.config.ttl();
        let mut inner = self.inner.lock();

        let expired = inner.entries.peek(identity).map(|entry| entry.is_expired(ttl));
        if expired.is_none() {
            drop(inner);
            self.stats.record_miss();
            return None;
        }

        if expired == Some(true) {
            inner.remove(identity);
            let (entries, memory) = (inner.entries.len(), inner.memory_used);
            drop(inner);
            self.stats.record_expiration();
            self.stats.record_miss();
            self.stats.set_size(entries, memory);
            return None;
        }

        let result = inner.entries.get_mut(identity).map(|entry| {
            entry.hit_count += 1;
            Arc::clone(&entry.result)
        });
        drop(inner);
        self.stats.record_hit();
        result
    }

    fn contains(&self, identity: &QueryIdentity) -> bool {
        let ttl = self.config.ttl();
        self.inner
            .lock()
            .entries
            .peek(identity)
            .map(|entry| !entry.is_expired(ttl))
            .unwrap_or(false)
    }

    fn peek(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>> {
        let ttl = self.config.ttl();
        self.inner
            .lock()
            .entries
            .peek(identity)
            .filter(|entry| !entry.is_expired(ttl))
            .map(|entry| Arc::clone(&entry.result))
    }

    fn upsert(&self, identity: QueryIdentity, result: Arc<QueryResult>) {
        let entry = CacheEntry::new(result);
        let entry_size = entry.size_bytes;
        let mut evicted = 0u64;
        let mut inserted = false;

        let (entries, memory) = {
            let mut inner = self.inner.lock();

            // Last write wins, even when the new result cannot be kept
            inner.remove(&identity);

            let oversized = self
                .config
                .max_memory_bytes
                .map(|limit| entry_size > limit)
                .unwrap_or(false);

            if oversized {
                tracing::debug!(
                    identity = %identity,
                    size = entry_size,
                    "query result exceeds memory bound, not cached"
                );
            } else {
                if let Some(limit) = self.config.max_memory_bytes {
                    while inner.memory_used + entry_size > limit {
                        match inner.entries.pop_lru() {
                            Some((_, old)) => {
                                inner.memory_used =
                                    inner.memory_used.saturating_sub(old.size_bytes);
                                evicted += 1;
                            }
                            None => break,
                        }
                    }
                }

                if let Some((_, old)) = inner.entries.push(identity, entry) {
                    inner.memory_used = inner.memory_used.saturating_sub(old.size_bytes);
                    evicted += 1;
                }
                inner.memory_used += entry_size;
                inserted = true;
            }
            (inner.entries.len(), inner.memory_used)
        };

        for _ in 0..evicted {
            self.stats.record_eviction();
        }
        if inserted {
            self.stats.record_insert();
        }
        self.stats.set_size(entries, memory);
    }

    fn enumerate(&self) -> Vec<Arc<QueryResult>> {
        let ttl = self.config.ttl();
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(ttl))
            .map(|(_, entry)| Arc::clone(&entry.result))
            .collect()
    }

    fn clear(&self) {
        {
            let mut inner = self.inner.lock();
            inner.entries.clear();
            inner.memory_used = 0;
        }
        self.stats.record_clear();
        self.stats.set_size(0, 0);
    }

    fn len(&self) -> usize {
        let ttl = self.config.ttl();
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(ttl))
            .count()
    }

    fn memory_used(&self) -> usize {
        self.inner.lock().memory_used
    }

    fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for LruStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruStore")
            .field("max_entries", &self.config.max_entries)
            .field("max_memory_bytes", &self.config.max_memory_bytes)
            .field("ttl", &self.config.ttl())
            .field("current_entries", &inner.entries.len())
            .field("memory_used", &inner.memory_used)
            .finish()
    }
}

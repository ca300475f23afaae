//! The cache store contract and the unbounded in-memory store.

use crate::config::{CacheConfig, StoreKind};
use crate::lru_store::LruStore;
use crate::stats::CacheStats;
use dash_core::{QueryIdentity, QueryResult, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key-value store from query identity to the latest result for it.
///
/// Implementations never block on I/O. `upsert` is last-write-wins and does
/// not assume at most one writer per identity. `enumerate` returns a
/// consistent point-in-time snapshot of the live entries.
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Look up a result, recording a hit or miss.
    fn get(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>>;

    /// Whether a live entry exists, without touching statistics or recency.
    fn contains(&self, identity: &QueryIdentity) -> bool;

    /// Read a live entry without touching statistics or recency.
    fn peek(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>>;

    fn upsert(&self, identity: QueryIdentity, result: Arc<QueryResult>);

    fn enumerate(&self) -> Vec<Arc<QueryResult>>;

    fn clear(&self);

    /// Number of live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held by cached results
    fn memory_used(&self) -> usize;

    fn stats(&self) -> Arc<CacheStats>;
}

/// Build the store selected by the configuration.
pub fn build_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    config.validate()?;
    let store: Arc<dyn CacheStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Lru => Arc::new(LruStore::new(config.clone())),
    };
    tracing::debug!(store = ?config.store, "built cache store");
    Ok(store)
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<QueryIdentity, Arc<QueryResult>>,
    memory_used: usize,
}

/// Unbounded store: entries stay until [`CacheStore::clear`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    stats: Arc<CacheStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>> {
        let found = self.inner.read().entries.get(identity).cloned();
        match found {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        found
    }

    fn contains(&self, identity: &QueryIdentity) -> bool {
        self.inner.read().entries.contains_key(identity)
    }

    fn peek(&self, identity: &QueryIdentity) -> Option<Arc<QueryResult>> {
        self.inner.read().entries.get(identity).cloned()
    }

    fn upsert(&self, identity: QueryIdentity, result: Arc<QueryResult>) {
        let size = result.memory_usage();
        let (entries, memory) = {
            let mut inner = self.inner.write();
            if let Some(old) = inner.entries.insert(identity, result) {
                inner.memory_used = inner.memory_used.saturating_sub(old.memory_usage());
            }
            inner.memory_used += size;
            (inner.entries.len(), inner.memory_used)
        };
        self.stats.record_insert();
        self.stats.set_size(entries, memory);
    }

    fn enumerate(&self) -> Vec<Arc<QueryResult>> {
        self.inner.read().entries.values().cloned().collect()
    }

    fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.entries.clear();
            inner.memory_used = 0;
        }
        self.stats.record_clear();
        self.stats.set_size(0, 0);
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    fn memory_used(&self) -> usize {
        self.inner.read().memory_used
    }

    fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryStore")
            .field("entries", &inner.entries.len())
            .field("memory_used", &inner.memory_used)
            .finish()
    }
}

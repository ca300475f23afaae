//! Cache store configuration

use dash_core::{DashError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which store implementation backs the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Unbounded in-memory map, no expiry
    #[default]
    Memory,
    /// LRU eviction with optional capacity, memory and TTL bounds
    Lru,
}

/// Configuration for the result store.
///
/// The default is an unbounded in-memory store without expiry: no size or
/// age limit is applied unless one is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: StoreKind,
    /// Maximum number of cached results
    pub max_entries: Option<usize>,
    /// Maximum approximate memory held by cached results
    pub max_memory_bytes: Option<usize>,
    /// Time-to-live of a cached result in milliseconds
    pub ttl_ms: Option<u64>,
}

impl CacheConfig {
    /// Unbounded in-memory store
    pub fn memory() -> Self {
        Self::default()
    }

    /// LRU store with no bounds set yet
    pub fn lru() -> Self {
        Self {
            store: StoreKind::Lru,
            ..Default::default()
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_memory(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = Some(max_memory_bytes);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Reject bounds the selected store cannot honour, and zero-sized bounds.
    pub fn validate(&self) -> Result<()> {
        if self.store == StoreKind::Memory
            && (self.max_entries.is_some()
                || self.max_memory_bytes.is_some()
                || self.ttl_ms.is_some())
        {
            return Err(DashError::Config(
                "max_entries, max_memory_bytes and ttl_ms require the 'lru' store".to_string(),
            ));
        }
        if self.max_entries == Some(0) {
            return Err(DashError::Config("max_entries must be positive".to_string()));
        }
        if self.max_memory_bytes == Some(0) {
            return Err(DashError::Config(
                "max_memory_bytes must be positive".to_string(),
            ));
        }
        if self.ttl_ms == Some(0) {
            return Err(DashError::Config("ttl_ms must be positive".to_string()));
        }
        Ok(())
    }
}

//! Result stores for the dashengine query cache.
//!
//! A [`CacheStore`] maps a [`QueryIdentity`](dash_core::QueryIdentity) to the
//! shared, immutable [`QueryResult`](dash_core::QueryResult) of its last
//! successful execution. Two policies are provided:
//!
//! - [`MemoryStore`]: unbounded map, entries live until cleared
//! - [`LruStore`]: optional capacity, memory bound and TTL, with LRU eviction
//!
//! [`build_store`] picks one from a [`CacheConfig`], so the policy can change
//! without touching callers.
//!
//! # Example
//!
//! ```ignore
//! use dash_cache::{build_store, CacheConfig};
//! use std::time::Duration;
//!
//! let store = build_store(&CacheConfig::lru().with_ttl(Duration::from_secs(300)))?;
//! if let Some(result) = store.get(&identity) {
//!     return Ok(result);
//! }
//! ```

pub mod config;
pub mod lru_store;
pub mod stats;
pub mod store;

pub use config::{CacheConfig, StoreKind};
pub use lru_store::LruStore;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{build_store, CacheStore, MemoryStore};

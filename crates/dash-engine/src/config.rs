//! Engine configuration

use dash_cache::CacheConfig;
use dash_core::{DashError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a [`DataSet`](crate::DataSet) and its scheduler.
///
/// Loaded from YAML; every field is optional:
///
/// ```yaml
/// queries_dir: queries
/// workers: 5
/// queue_capacity: 64
/// query_timeout_ms: 300000
/// drain_before_list: true
/// cache:
///   store: lru
///   ttl_ms: 300000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `<query_id>.yml` definitions
    pub queries_dir: PathBuf,
    /// Number of long-lived workers executing queries
    pub workers: usize,
    /// Jobs that may wait for a free worker before submission blocks
    pub queue_capacity: usize,
    /// Bound on a single warehouse call
    pub query_timeout_ms: u64,
    /// Resolve pending prefetches before listing cached results
    pub drain_before_list: bool,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queries_dir: PathBuf::from("queries"),
            workers: 5,
            queue_capacity: 64,
            query_timeout_ms: 300_000, // 5 minutes
            drain_before_list: true,
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DashError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(source)
            .map_err(|e| DashError::Config(format!("invalid engine configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DashError::Config("workers must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(DashError::Config(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(DashError::Config(
                "query_timeout_ms must be positive".to_string(),
            ));
        }
        self.cache.validate()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn with_queries_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queries_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_drain_before_list(mut self, drain: bool) -> Self {
        self.drain_before_list = drain;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

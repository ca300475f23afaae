//! The cache facade used by page renderers.

use crate::config::EngineConfig;
use crate::executor::QueryExecutor;
use crate::scheduler::CoalescingScheduler;
use crate::stats::ExecutionStatsSnapshot;
use dash_cache::{build_store, CacheStatsSnapshot, CacheStore};
use dash_core::{
    DefinitionLoader, ParameterBinding, ParameterValue, QueryIdentity, QueryResult, Result,
    YamlDefinitionLoader,
};
use serde::Serialize;
use std::sync::Arc;

const MIB: f64 = (1 << 20) as f64;

/// One row of the query profiler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryProfile {
    pub query_id: String,
    pub name: String,
    pub identity: String,
    pub rows: usize,
    pub duration_secs: f64,
    pub bytes_processed: u64,
    pub bytes_billed: u64,
    pub memory_mb: f64,
}

impl QueryProfile {
    fn from_result(result: &QueryResult) -> Self {
        Self {
            query_id: result.source().id.clone(),
            name: result.source().name.clone(),
            identity: result.identity().to_string(),
            rows: result.num_rows(),
            duration_secs: result.duration().as_secs_f64(),
            bytes_processed: result.bytes_processed(),
            bytes_billed: result.bytes_billed(),
            memory_mb: result.memory_usage() as f64 / MIB,
        }
    }
}

/// Query results for a dashboard, cached per identity.
///
/// Callers prefetch everything a page needs up front and then fetch results
/// one by one; the first fetch that misses runs the whole pending batch.
pub struct DataSet {
    scheduler: CoalescingScheduler,
    loader: Arc<dyn DefinitionLoader>,
    drain_before_list: bool,
}

impl DataSet {
    /// Definitions are read from `config.queries_dir`, results are kept in
    /// the store selected by `config.cache`.
    pub fn new(config: EngineConfig, executor: Arc<dyn QueryExecutor>) -> Result<Self> {
        let loader = Arc::new(YamlDefinitionLoader::new(config.queries_dir.clone()));
        Self::with_loader(config, loader, executor)
    }

    pub fn with_loader(
        config: EngineConfig,
        loader: Arc<dyn DefinitionLoader>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self> {
        let store = build_store(&config.cache)?;
        Self::with_store(config, store, loader, executor)
    }

    pub fn with_store(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        loader: Arc<dyn DefinitionLoader>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self> {
        let scheduler =
            CoalescingScheduler::new(&config, store, Arc::clone(&loader), executor)?;
        tracing::info!(
            workers = config.workers,
            timeout_ms = config.query_timeout_ms,
            store = ?config.cache.store,
            "query cache ready"
        );
        Ok(Self {
            scheduler,
            loader,
            drain_before_list: config.drain_before_list,
        })
    }

    /// Queue identities to run on the next drain. Returns how many were
    /// newly queued.
    pub fn prefetch<I>(&self, identities: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<QueryIdentity>,
    {
        self.scheduler.prefetch(identities)
    }

    pub async fn fetch(&self, identity: impl Into<QueryIdentity>) -> Result<Arc<QueryResult>> {
        self.scheduler.fetch(identity).await
    }

    /// Bind `parameters` against the definition of `query_id` and fetch the
    /// resulting identity. Binding errors are reported without executing.
    pub async fn fetch_parameterized<I, K, V>(
        &self,
        query_id: &str,
        parameters: I,
    ) -> Result<Arc<QueryResult>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParameterValue>,
    {
        let identity = self.identity(query_id, parameters)?;
        self.fetch(identity).await
    }

    /// Build a validated identity for `query_id`.
    pub fn identity<I, K, V>(&self, query_id: &str, parameters: I) -> Result<QueryIdentity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParameterValue>,
    {
        let definition = self.loader.load(query_id)?;
        let binding = ParameterBinding::bind(&definition, parameters)?;
        Ok(QueryIdentity::with_parameters(query_id, binding))
    }

    /// Every cached result, after running anything still pending when
    /// `drain_before_list` is set. Failed prefetches are simply absent.
    pub async fn list(&self) -> Vec<Arc<QueryResult>> {
        if self.drain_before_list {
            self.scheduler.drain().await;
        }
        self.scheduler.store().enumerate()
    }

    pub fn invalidate(&self) {
        self.scheduler.invalidate();
    }

    pub fn num_cached(&self) -> usize {
        self.scheduler.store().len()
    }

    /// Profiling rows for every cached result, sorted by query name and
    /// then identity.
    pub fn profile(&self) -> Vec<QueryProfile> {
        let mut rows: Vec<_> = self
            .scheduler
            .store()
            .enumerate()
            .iter()
            .map(|result| QueryProfile::from_result(result))
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.identity.cmp(&b.identity)));
        rows
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.scheduler.store().stats().snapshot()
    }

    pub fn execution_stats(&self) -> ExecutionStatsSnapshot {
        self.scheduler.stats().snapshot()
    }

    pub fn scheduler(&self) -> &CoalescingScheduler {
        &self.scheduler
    }
}

impl std::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSet")
            .field("scheduler", &self.scheduler)
            .field("drain_before_list", &self.drain_before_list)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CannedExecutor;
    use dash_core::{DashError, ParameterSpec, ParameterType, QueryDefinition, StaticDefinitionLoader};

    fn dataset(config: EngineConfig, executor: Arc<CannedExecutor>) -> DataSet {
        let loader = StaticDefinitionLoader::new()
            .with_definition(QueryDefinition::new("a", "Alpha", "SELECT 1"))
            .with_definition(QueryDefinition::new("b", "Beta", "SELECT 2"))
            .with_definition(
                QueryDefinition::new("sales", "Sales", "SELECT * FROM sales WHERE region = {{region}}")
                    .with_parameter(ParameterSpec::scalar("region", ParameterType::String)),
            );
        DataSet::with_loader(config, Arc::new(loader), executor).unwrap()
    }

    fn executor() -> Arc<CannedExecutor> {
        Arc::new(
            CannedExecutor::new()
                .with_ints("SELECT 1", "n", vec![1])
                .with_ints("SELECT 2", "n", vec![2, 2])
                .with_ints("SELECT * FROM sales WHERE region = {{region}}", "total", vec![10]),
        )
    }

    #[tokio::test]
    async fn test_list_drains_pending() {
        let executor = executor();
        let dataset = dataset(EngineConfig::default(), Arc::clone(&executor));

        dataset.prefetch(["a", "b"]);
        assert_eq!(dataset.list().await.len(), 2);
        assert_eq!(dataset.num_cached(), 2);
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_list_without_drain() {
        let executor = executor();
        let config = EngineConfig::default().with_drain_before_list(false);
        let dataset = dataset(config, Arc::clone(&executor));

        dataset.prefetch(["a"]);
        assert!(dataset.list().await.is_empty());
        assert_eq!(executor.calls(), 0);
        assert_eq!(dataset.scheduler().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_parameterized_binding_error() {
        let executor = executor();
        let dataset = dataset(EngineConfig::default(), Arc::clone(&executor));

        let err = dataset
            .fetch_parameterized("sales", Vec::<(String, ParameterValue)>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DashError::ParameterBinding { .. }));
        assert!(err.to_string().contains("region"));

        let err = dataset
            .fetch_parameterized("sales", [("region", 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, DashError::ParameterBinding { .. }));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_parameterized() {
        let executor = executor();
        let dataset = dataset(EngineConfig::default(), Arc::clone(&executor));

        let result = dataset
            .fetch_parameterized("sales", [("region", "EMEA")])
            .await
            .unwrap();
        assert_eq!(result.num_rows(), 1);
        assert_eq!(
            result.identity().to_string(),
            "sales{region=\"EMEA\"}"
        );
    }

    #[tokio::test]
    async fn test_profile_rows() {
        let executor = executor();
        let dataset = dataset(EngineConfig::default(), Arc::clone(&executor));

        dataset.prefetch(["b", "a"]);
        dataset.list().await;

        let profile = dataset.profile();
        let names: Vec<_> = profile.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
        assert_eq!(profile[1].rows, 2);
        assert!(profile[0].memory_mb > 0.0);
        assert!(profile[0].bytes_billed >= profile[0].bytes_processed);
    }

    #[tokio::test]
    async fn test_stats() {
        let executor = executor();
        let dataset = dataset(EngineConfig::default(), Arc::clone(&executor));

        dataset.fetch("a").await.unwrap();
        dataset.fetch("a").await.unwrap();

        let cache = dataset.cache_stats();
        assert_eq!(cache.hits, 1);
        assert_eq!(dataset.execution_stats().dispatched, 1);
        assert_eq!(dataset.execution_stats().succeeded, 1);
    }
}

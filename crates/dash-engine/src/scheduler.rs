//! Request coalescing and drain cycles.
//!
//! Every identity is in exactly one of four states: absent, pending (queued
//! by a prefetch or fetch but not yet dispatched), in flight (one executor
//! call outstanding) or cached. Pending and in-flight identities carry a
//! shared outcome that every interested caller awaits, so concurrent
//! requests for one identity collapse onto a single execution and all
//! observe the same result or the same error.

use crate::config::EngineConfig;
use crate::executor::QueryExecutor;
use crate::pool::WorkerPool;
use crate::stats::ExecutionStats;
use dash_cache::CacheStore;
use dash_core::{DashError, DefinitionLoader, QueryIdentity, QueryResult, Result};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

type Outcome = Result<Arc<QueryResult>>;
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// A queued request: the sending half is handed to the job at dispatch.
struct PendingRequest {
    sender: oneshot::Sender<Outcome>,
    outcome: SharedOutcome,
}

impl PendingRequest {
    fn new(identity: &QueryIdentity) -> Self {
        let (sender, receiver) = oneshot::channel();
        let label = identity.to_string();
        let outcome = receiver
            .map(move |received| {
                received.unwrap_or(Err(DashError::Abandoned { identity: label }))
            })
            .boxed()
            .shared();
        Self { sender, outcome }
    }
}

#[derive(Default)]
struct SchedulerState {
    requests: HashMap<QueryIdentity, PendingRequest>,
    in_flight: HashMap<QueryIdentity, SharedOutcome>,
    /// Bumped by every invalidation
    generation: u64,
}

enum Ticket {
    Ready(Arc<QueryResult>),
    Waiting(SharedOutcome),
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    store: Arc<dyn CacheStore>,
    loader: Arc<dyn DefinitionLoader>,
    executor: Arc<dyn QueryExecutor>,
    timeout: Duration,
    stats: ExecutionStats,
}

impl SchedulerInner {
    /// Join the pending or running execution of `identity`, or queue a new one.
    fn ticket(&self, identity: &QueryIdentity) -> Ticket {
        let mut state = self.state.lock();

        if let Some(result) = self.store.peek(identity) {
            return Ticket::Ready(result);
        }
        if let Some(outcome) = state.in_flight.get(identity) {
            self.stats.record_coalesced();
            return Ticket::Waiting(outcome.clone());
        }
        if let Some(request) = state.requests.get(identity) {
            self.stats.record_coalesced();
            return Ticket::Waiting(request.outcome.clone());
        }

        let request = PendingRequest::new(identity);
        let outcome = request.outcome.clone();
        state.requests.insert(identity.clone(), request);
        Ticket::Waiting(outcome)
    }

    /// Publish a finished execution: cache it unless the store was
    /// invalidated since dispatch, then release the in-flight marker.
    fn publish(&self, identity: &QueryIdentity, generation: u64, outcome: &Outcome) {
        let mut state = self.state.lock();
        if let Ok(result) = outcome {
            if state.generation == generation {
                self.store.upsert(identity.clone(), Arc::clone(result));
            } else {
                tracing::debug!(
                    identity = %identity,
                    "discarding result that finished after invalidation"
                );
            }
        }
        state.in_flight.remove(identity);
    }

    async fn run(&self, identity: &QueryIdentity) -> Outcome {
        let definition = self.loader.load(identity.query_id())?;
        identity.parameters().validate(&definition)?;

        let call = self
            .executor
            .execute(&definition.body, identity.parameters());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(output)) => Ok(Arc::new(QueryResult::new(
                definition,
                identity.parameters().clone(),
                output,
            ))),
            Ok(Err(err)) => Err(DashError::Execution {
                identity: identity.to_string(),
                message: format!("{:#}", err),
            }),
            Err(_) => Err(DashError::Timeout {
                identity: identity.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// One dispatched execution.
///
/// Dropping it before [`Dispatch::complete`] (job dropped by a stopped pool,
/// submission failure) clears the in-flight marker and fails the waiters
/// with [`DashError::Abandoned`], so the identity can be retried.
struct Dispatch {
    inner: Arc<SchedulerInner>,
    identity: QueryIdentity,
    generation: u64,
    sender: Option<oneshot::Sender<Outcome>>,
}

impl Dispatch {
    async fn execute(self) {
        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.inner.run(&self.identity))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(DashError::Execution {
                identity: self.identity.to_string(),
                message: "executor panicked".to_string(),
            }),
        };

        let stats = &self.inner.stats;
        match &outcome {
            Ok(result) => {
                stats.record_success();
                tracing::debug!(
                    identity = %self.identity,
                    result_id = %result.id(),
                    rows = result.num_rows(),
                    elapsed = ?started.elapsed(),
                    "query executed"
                );
            }
            Err(err) => {
                stats.record_failure();
                if matches!(err, DashError::Timeout { .. }) {
                    stats.record_timeout();
                }
                tracing::warn!(identity = %self.identity, "query failed: {}", err);
            }
        }

        self.complete(outcome);
    }

    fn complete(mut self, outcome: Outcome) {
        self.inner
            .publish(&self.identity, self.generation, &outcome);
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            self.inner.state.lock().in_flight.remove(&self.identity);
            let _ = sender.send(Err(DashError::Abandoned {
                identity: self.identity.to_string(),
            }));
        }
    }
}

/// Summary of one drain cycle
#[derive(Debug, Default)]
pub struct DrainReport {
    pub succeeded: Vec<QueryIdentity>,
    pub failed: Vec<(QueryIdentity, DashError)>,
}

impl DrainReport {
    /// Identities dispatched in this cycle
    pub fn dispatched(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched() == 0
    }

    pub fn error_for(&self, identity: &QueryIdentity) -> Option<&DashError> {
        self.failed
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, err)| err)
    }
}

/// Deduplicates query requests and executes each distinct identity at most
/// once at a time on a bounded worker pool.
pub struct CoalescingScheduler {
    inner: Arc<SchedulerInner>,
    pool: WorkerPool,
}

impl CoalescingScheduler {
    /// Create a scheduler; must be called from within a Tokio runtime.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn CacheStore>,
        loader: Arc<dyn DefinitionLoader>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::start(config.workers, config.queue_capacity)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState::default()),
                store,
                loader,
                executor,
                timeout: config.query_timeout(),
                stats: ExecutionStats::new(),
            }),
            pool,
        })
    }

    /// Queue identities for the next drain, skipping any that are cached,
    /// already queued or in flight. Returns how many were newly queued.
    pub fn prefetch<I>(&self, identities: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<QueryIdentity>,
    {
        let mut state = self.inner.state.lock();
        let mut queued = 0;
        for identity in identities {
            let identity = identity.into();
            if self.inner.store.contains(&identity)
                || state.in_flight.contains_key(&identity)
                || state.requests.contains_key(&identity)
            {
                continue;
            }
            let request = PendingRequest::new(&identity);
            state.requests.insert(identity, request);
            queued += 1;
        }
        if queued > 0 {
            tracing::debug!(queued, pending = state.requests.len(), "queued prefetch");
        }
        queued
    }

    /// Dispatch every pending identity to the worker pool and wait for the
    /// whole batch to finish.
    ///
    /// Successful results are cached before this returns; failed identities
    /// are not cached and may be requested again.
    pub async fn drain(&self) -> DrainReport {
        // Every identity moved into `in_flight` is owned by a `Dispatch`
        // before the first await, so a dropped drain still releases it.
        let (dispatches, waiting) = {
            let mut state = self.inner.state.lock();
            let requests = std::mem::take(&mut state.requests);
            let generation = state.generation;
            let mut dispatches = Vec::with_capacity(requests.len());
            let mut waiting = Vec::with_capacity(requests.len());

            for (identity, request) in requests {
                if let Some(result) = self.inner.store.peek(&identity) {
                    let _ = request.sender.send(Ok(result));
                    continue;
                }
                state
                    .in_flight
                    .insert(identity.clone(), request.outcome.clone());
                waiting.push((identity.clone(), request.outcome));
                dispatches.push(Dispatch {
                    inner: Arc::clone(&self.inner),
                    identity,
                    generation,
                    sender: Some(request.sender),
                });
            }
            (dispatches, waiting)
        };

        if dispatches.is_empty() {
            return DrainReport::default();
        }

        self.inner.stats.record_drain();
        let started = Instant::now();

        for dispatch in dispatches {
            self.inner.stats.record_dispatch();
            // A rejected job is dropped, which releases its in-flight marker
            if let Err(err) = self.pool.submit(dispatch.execute().boxed()).await {
                tracing::error!("cannot dispatch query: {}", err);
            }
        }

        let outcomes = join_all(waiting.iter().map(|(_, outcome)| outcome.clone())).await;

        let mut report = DrainReport::default();
        for ((identity, _), outcome) in waiting.into_iter().zip(outcomes) {
            match outcome {
                Ok(_) => report.succeeded.push(identity),
                Err(err) => report.failed.push((identity, err)),
            }
        }

        tracing::info!(
            dispatched = report.dispatched(),
            failed = report.failed.len(),
            elapsed = ?started.elapsed(),
            "drained query requests"
        );
        report
    }

    /// Return the cached result for `identity`, executing it (together with
    /// everything else pending) if it is not cached yet.
    pub async fn fetch(&self, identity: impl Into<QueryIdentity>) -> Result<Arc<QueryResult>> {
        let identity = identity.into();
        if let Some(result) = self.inner.store.get(&identity) {
            tracing::debug!(identity = %identity, "cache hit");
            return Ok(result);
        }

        match self.inner.ticket(&identity) {
            Ticket::Ready(result) => Ok(result),
            Ticket::Waiting(outcome) => {
                self.drain().await;
                outcome.await
            }
        }
    }

    /// Clear the store. Executions already in flight still complete and
    /// reach their waiters, but their results are not cached.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        self.inner.store.clear();
        tracing::info!(
            in_flight = state.in_flight.len(),
            "invalidated query cache"
        );
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.inner.store
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.inner.stats
    }

    /// Identities queued but not yet dispatched
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().requests.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl std::fmt::Debug for CoalescingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingScheduler")
            .field("pending", &self.pending_count())
            .field("in_flight", &self.in_flight_count())
            .field("timeout", &self.inner.timeout)
            .field("pool", &self.pool)
            .field("store", &self.inner.store)
            .finish()
    }
}

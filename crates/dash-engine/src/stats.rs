//! Execution counters for the coalescing scheduler

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the scheduler
#[derive(Debug, Default)]
pub struct ExecutionStats {
    /// Identities handed to the worker pool
    dispatched: AtomicU64,
    /// Executions that produced a result
    succeeded: AtomicU64,
    /// Failures of any kind, timeouts included
    failed: AtomicU64,
    /// Executions cut off by the query timeout
    timed_out: AtomicU64,
    /// Requests that joined an already pending or running execution
    coalesced: AtomicU64,
    /// Drains that dispatched at least one identity
    drains: AtomicU64,
}

/// Point-in-time copy of [`ExecutionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStatsSnapshot {
    /// Number of dispatched identities
    pub dispatched: u64,
    /// Number of successful executions
    pub succeeded: u64,
    /// Number of failed executions
    pub failed: u64,
    /// Number of timed out executions
    pub timed_out: u64,
    /// Number of coalesced requests
    pub coalesced: u64,
    /// Number of drains
    pub drains: u64,
}

impl ExecutionStats {
    /// Create new execution statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatch to the worker pool
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful execution
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed execution
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timed out execution
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a coalesced request
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drain
    pub fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
        }
    }
}

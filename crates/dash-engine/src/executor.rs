//! The warehouse execution seam.

use anyhow::anyhow;
use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use dash_core::{ExecutionOutput, ParameterBinding};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs a query body with bound parameters against the warehouse.
///
/// Calls may be slow and may fail for network, authentication, quota or SQL
/// reasons; the scheduler bounds each call with a timeout and never retries.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        body: &str,
        parameters: &ParameterBinding,
    ) -> anyhow::Result<ExecutionOutput>;
}

type Handler = Arc<dyn Fn(&ParameterBinding) -> anyhow::Result<Vec<RecordBatch>> + Send + Sync>;

/// How a [`CannedExecutor`] answers a query body
#[derive(Clone)]
pub enum CannedResponse {
    Batches(Vec<RecordBatch>),
    /// Compute batches from the bound parameters
    Handler(Handler),
    Failure(String),
    /// Never complete
    Hang,
}

/// Executor serving canned responses keyed by query body.
///
/// Stands in for the warehouse in demos and tests and counts every call.
pub struct CannedExecutor {
    responses: RwLock<HashMap<String, CannedResponse>>,
    calls: AtomicUsize,
    calls_by_body: RwLock<HashMap<String, usize>>,
    latency: Duration,
}

impl Default for CannedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedExecutor {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            calls_by_body: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_response(self, body: impl Into<String>, response: CannedResponse) -> Self {
        self.set_response(body, response);
        self
    }

    /// Answer `body` with one `Int64` column named `column`
    pub fn with_ints(self, body: impl Into<String>, column: &str, values: Vec<i64>) -> Self {
        let column = column.to_string();
        self.with_handler(body, move |_| Ok(vec![int_batch(&column, values.clone())?]))
    }

    pub fn with_handler<F>(self, body: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ParameterBinding) -> anyhow::Result<Vec<RecordBatch>> + Send + Sync + 'static,
    {
        self.with_response(body, CannedResponse::Handler(Arc::new(handler)))
    }

    pub fn with_failure(self, body: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_response(body, CannedResponse::Failure(message.into()))
    }

    pub fn with_hang(self, body: impl Into<String>) -> Self {
        self.with_response(body, CannedResponse::Hang)
    }

    pub fn set_response(&self, body: impl Into<String>, response: CannedResponse) {
        self.responses.write().insert(body.into(), response);
    }

    /// Total number of calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, body: &str) -> usize {
        self.calls_by_body.read().get(body).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QueryExecutor for CannedExecutor {
    async fn execute(
        &self,
        body: &str,
        parameters: &ParameterBinding,
    ) -> anyhow::Result<ExecutionOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_body
            .write()
            .entry(body.to_string())
            .or_insert(0) += 1;

        let started_at = Utc::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = self.responses.read().get(body).cloned();
        let batches = match response {
            Some(CannedResponse::Batches(batches)) => batches,
            Some(CannedResponse::Handler(handler)) => handler(parameters)?,
            Some(CannedResponse::Failure(message)) => return Err(anyhow!(message)),
            Some(CannedResponse::Hang) => std::future::pending().await,
            None => return Err(anyhow!("no canned response for query body: {}", body)),
        };

        let processed: u64 = batches
            .iter()
            .map(|b| b.get_array_memory_size() as u64)
            .sum();
        // billed in whole MiB
        let billed = processed.div_ceil(1 << 20) * (1 << 20);

        Ok(ExecutionOutput::new(batches)
            .with_timing(started_at, Utc::now())
            .with_bytes(processed, billed))
    }
}

/// Build a single-column `Int64` record batch
pub fn int_batch(column: &str, values: Vec<i64>) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::Int64Type;

    #[tokio::test]
    async fn test_canned_batches() {
        let executor = CannedExecutor::new().with_ints("SELECT 1", "n", vec![1]);
        let output = executor
            .execute("SELECT 1", &ParameterBinding::new())
            .await
            .unwrap();

        assert_eq!(output.batches.len(), 1);
        let column = output.batches[0].column(0).as_primitive::<Int64Type>();
        assert_eq!(column.value(0), 1);
        assert!(output.bytes_billed >= output.bytes_processed);
        assert_eq!(executor.calls(), 1);
        assert_eq!(executor.calls_for("SELECT 1"), 1);
    }

    #[tokio::test]
    async fn test_canned_handler_sees_parameters() {
        let executor = CannedExecutor::new().with_handler("SELECT {{n}}", |params| {
            match params.get("n") {
                Some(dash_core::ParameterValue::Scalar(dash_core::ScalarValue::Int64(n))) => {
                    Ok(vec![int_batch("n", vec![*n])?])
                }
                _ => Err(anyhow!("n is required")),
            }
        });

        let params = ParameterBinding::new().with("n", 7i64);
        let output = executor.execute("SELECT {{n}}", &params).await.unwrap();
        assert_eq!(output.batches[0].num_rows(), 1);

        assert!(executor
            .execute("SELECT {{n}}", &ParameterBinding::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_canned_failure_and_unknown_body() {
        let executor = CannedExecutor::new().with_failure("SELECT x", "quota exceeded");
        let err = executor
            .execute("SELECT x", &ParameterBinding::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");

        assert!(executor
            .execute("SELECT y", &ParameterBinding::new())
            .await
            .is_err());
        assert_eq!(executor.calls(), 2);
    }
}

//! Immutable query result records.

use crate::binding::ParameterBinding;
use crate::definition::QueryDefinition;
use crate::identity::QueryIdentity;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Raw output of one warehouse execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub batches: Vec<RecordBatch>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub bytes_processed: u64,
    pub bytes_billed: u64,
}

impl ExecutionOutput {
    /// Output with both timestamps set to now and no billing metadata
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        let now = Utc::now();
        Self {
            batches,
            started_at: now,
            ended_at: now,
            bytes_processed: 0,
            bytes_billed: 0,
        }
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self.ended_at = ended_at;
        self
    }

    pub fn with_bytes(mut self, processed: u64, billed: u64) -> Self {
        self.bytes_processed = processed;
        self.bytes_billed = billed;
        self
    }
}

/// The result of one successful execution of a query identity.
///
/// Constructed once, shared behind an `Arc`, never mutated.
#[derive(Debug)]
pub struct QueryResult {
    id: Uuid,
    source: Arc<QueryDefinition>,
    parameters: ParameterBinding,
    batches: Vec<RecordBatch>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    bytes_processed: u64,
    bytes_billed: u64,
}

impl QueryResult {
    pub fn new(
        source: Arc<QueryDefinition>,
        parameters: ParameterBinding,
        output: ExecutionOutput,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            parameters,
            batches: output.batches,
            started_at: output.started_at,
            ended_at: output.ended_at,
            bytes_processed: output.bytes_processed,
            bytes_billed: output.bytes_billed,
        }
    }

    /// Process-unique id of this execution
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &QueryDefinition {
        &self.source
    }

    pub fn parameters(&self) -> &ParameterBinding {
        &self.parameters
    }

    pub fn identity(&self) -> QueryIdentity {
        QueryIdentity::with_parameters(self.source.id.clone(), self.parameters.clone())
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Wall time reported by the warehouse; zero if the clock went backwards.
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    pub fn bytes_billed(&self) -> u64 {
        self.bytes_billed
    }

    /// Approximate in-memory size of the result batches in bytes
    pub fn memory_usage(&self) -> usize {
        self.batches
            .iter()
            .map(|batch| {
                batch
                    .columns()
                    .iter()
                    .map(|col| col.get_array_memory_size())
                    .sum::<usize>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use chrono::TimeDelta;

    fn batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_result_metadata() {
        let started = Utc::now();
        let ended = started + TimeDelta::milliseconds(1500);
        let output = ExecutionOutput::new(vec![batch(vec![1, 2]), batch(vec![3])])
            .with_timing(started, ended)
            .with_bytes(2048, 10_485_760);
        let source = Arc::new(QueryDefinition::new("a", "A", "SELECT 1"));
        let result = QueryResult::new(source, ParameterBinding::new(), output);

        assert_eq!(result.num_rows(), 3);
        assert_eq!(result.duration(), Duration::from_millis(1500));
        assert_eq!(result.bytes_processed(), 2048);
        assert_eq!(result.bytes_billed(), 10_485_760);
        assert!(result.memory_usage() > 0);
        assert_eq!(result.identity(), QueryIdentity::from("a"));
    }

    #[test]
    fn test_result_ids_are_unique() {
        let source = Arc::new(QueryDefinition::new("a", "A", "SELECT 1"));
        let first = QueryResult::new(
            Arc::clone(&source),
            ParameterBinding::new(),
            ExecutionOutput::new(vec![]),
        );
        let second = QueryResult::new(source, ParameterBinding::new(), ExecutionOutput::new(vec![]));
        assert_ne!(first.id(), second.id());
        assert_eq!(first.duration(), Duration::ZERO);
    }
}

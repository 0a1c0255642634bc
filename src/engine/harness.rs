use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::engine::catalog::QueryCatalog;
use crate::executors::executor_trait::ExecutorRegistry;
use crate::querylog::sink_trait::QueryLogSink;
use crate::utils::{
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, Complexity, Dataset, FilterParams, LogEntry, QueryLogRecord, ResultTable},
};

/// Outcome of one timed executor call
#[derive(Debug, Clone)]
pub struct TimedResult {
    pub table: ResultTable,
    pub duration: Duration,
    pub dataset: Dataset,
    pub backend: Backend,
    pub complexity: Complexity,
}

impl TimedResult {
    pub fn log_entry(&self) -> LogEntry {
        LogEntry {
            data_source: self.backend,
            query_complexity: self.complexity,
            dataset: self.dataset,
            duration: self.duration.as_secs_f64(),
        }
    }
}

/// A successful run together with the outcome of logging it
#[derive(Debug)]
pub struct BenchmarkRun {
    pub result: TimedResult,
    pub log: BenchResult<QueryLogRecord>,
}

/// Resolves, times and logs benchmark queries
pub struct BenchmarkHarness {
    catalog: QueryCatalog,
    executors: ExecutorRegistry,
    sink: Arc<dyn QueryLogSink>,
}

impl BenchmarkHarness {
    pub fn new(catalog: QueryCatalog, executors: ExecutorRegistry, sink: Arc<dyn QueryLogSink>) -> Self {
        Self {
            catalog,
            executors,
            sink,
        }
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn sink(&self) -> &Arc<dyn QueryLogSink> {
        &self.sink
    }

    /// Resolve and execute a query, timing only the executor call
    pub async fn execute_timed(
        &self,
        dataset: Dataset,
        backend: Backend,
        complexity: Complexity,
        params: &FilterParams,
    ) -> BenchResult<TimedResult> {
        let descriptor = self.catalog.resolve(dataset, backend, complexity)?;
        if params.dataset() != dataset {
            return Err(ConnectorError::InvalidParameters(format!(
                "{} filters given for a {} query",
                params.dataset(),
                dataset
            ))
            .into());
        }
        let executor = self
            .executors
            .get(backend)
            .ok_or_else(|| BenchError::Configuration(format!("No executor registered for {}", backend)))?;

        debug!(%dataset, %backend, %complexity, query = %descriptor.summary(), "executing");
        let start = Instant::now();
        let outcome = executor.execute(descriptor, params).await;
        let duration = start.elapsed();

        match outcome {
            Ok(table) => {
                info!(
                    %dataset, %backend, %complexity,
                    rows = table.row_count(),
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    "query completed"
                );
                Ok(TimedResult {
                    table,
                    duration,
                    dataset,
                    backend,
                    complexity,
                })
            }
            Err(e) => {
                warn!(%dataset, %backend, %complexity, error = %e, "query failed");
                Err(e)
            }
        }
    }

    /// Append the timing of a completed run to the query log
    pub async fn record(&self, timed: &TimedResult) -> BenchResult<QueryLogRecord> {
        match self.sink.append(&timed.log_entry()).await {
            Ok(record) => {
                debug!(id = record.id, "query logged");
                Ok(record)
            }
            Err(e) => {
                error!(sink = %self.sink.describe(), error = %e, "failed to log query");
                Err(e)
            }
        }
    }

    /// Execute and then log. A logging failure is reported in the returned
    /// run and never fails the run itself; a failed query is not logged.
    pub async fn run(
        &self,
        dataset: Dataset,
        backend: Backend,
        complexity: Complexity,
        params: &FilterParams,
    ) -> BenchResult<BenchmarkRun> {
        let result = self.execute_timed(dataset, backend, complexity, params).await?;
        let log = self.record(&result).await;
        Ok(BenchmarkRun { result, log })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::catalog::QueryDescriptor;
    use crate::executors::executor_trait::BackendExecutor;
    use crate::querylog::sqlite_sink::SqliteLogSink;
    use crate::utils::types::{ColumnMetadata, DataType, Row, Value};
    use async_trait::async_trait;

    struct FixedExecutor {
        backend: Backend,
        fail: bool,
    }

    #[async_trait]
    impl BackendExecutor for FixedExecutor {
        async fn execute(&self, _descriptor: &QueryDescriptor, _params: &FilterParams) -> BenchResult<ResultTable> {
            if self.fail {
                return Err(ConnectorError::BackendUnavailable("down".to_string()).into());
            }
            Ok(ResultTable::new(
                vec![ColumnMetadata::new("iSex", DataType::Integer), ColumnMetadata::new("count", DataType::Integer)],
                vec![Row::new(vec![Value::Integer(0), Value::Integer(1)])],
            ))
        }

        fn backend(&self) -> Backend {
            self.backend
        }
    }

    fn harness(fail: bool) -> BenchmarkHarness {
        let mut executors = ExecutorRegistry::new();
        executors
            .register(Box::new(FixedExecutor { backend: Backend::Relational, fail }))
            .unwrap();
        BenchmarkHarness::new(
            QueryCatalog::standard().unwrap(),
            executors,
            Arc::new(SqliteLogSink::in_memory().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_run_logs_once() {
        let harness = harness(false);
        let params = FilterParams::default_for(Dataset::Census);

        let run = harness
            .run(Dataset::Census, Backend::Relational, Complexity::Simple, &params)
            .await
            .unwrap();
        let record = run.log.unwrap();
        assert_eq!(record.data_source, Backend::Relational);
        assert_eq!(record.duration, run.result.duration.as_secs_f64());
        assert_eq!(harness.sink().read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_not_logged() {
        let harness = harness(true);
        let params = FilterParams::default_for(Dataset::Census);

        let err = harness
            .run(Dataset::Census, Backend::Relational, Complexity::Simple, &params)
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert!(harness.sink().read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parameters_checked_before_execution() {
        let harness = harness(false);
        let params = FilterParams::default_for(Dataset::Ecommerce);

        let err = harness
            .execute_timed(Dataset::Census, Backend::Relational, Complexity::Simple, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Connector(ConnectorError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_missing_executor_and_unsupported_combination() {
        let harness = harness(false);

        let err = harness
            .execute_timed(
                Dataset::Census,
                Backend::Document,
                Complexity::Simple,
                &FilterParams::default_for(Dataset::Census),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Configuration(_)));

        let err = harness
            .execute_timed(
                Dataset::Ecommerce,
                Backend::FlatFile,
                Complexity::Complex,
                &FilterParams::default_for(Dataset::Ecommerce),
            )
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use tokio::sync::OnceCell;
use tracing::info;

use crate::executors::postgres_executor::create_pool;
use crate::querylog::sink_trait::{record_from_labels, QueryLogSink, QUERY_LOG_TABLE};
use crate::utils::{
    config::PostgresConfig,
    error::{BenchResult, LogSinkError},
    types::{LogEntry, QueryLogRecord},
};

/// Query log in a PostgreSQL table shared by every benchmark client
pub struct PostgresLogSink {
    pool: Pool,
    table_ready: OnceCell<()>,
    target: String,
}

impl PostgresLogSink {
    pub fn new(config: &PostgresConfig) -> BenchResult<Self> {
        Ok(Self {
            pool: create_pool(config)?,
            table_ready: OnceCell::new(),
            target: format!("{}@{}:{}/{}", config.user, config.host, config.port, config.dbname),
        })
    }

    async fn client(&self) -> BenchResult<Object> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| LogSinkError::Unavailable(format!("Failed to get connection from pool: {}", e)))?;
        Ok(client)
    }

    async fn ready_client(&self) -> BenchResult<Object> {
        self.table_ready.get_or_try_init(|| self.ensure_table()).await?;
        self.client().await
    }
}

#[async_trait]
impl QueryLogSink for PostgresLogSink {
    async fn ensure_table(&self) -> BenchResult<()> {
        let client = self.client().await?;
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id SERIAL PRIMARY KEY,
                    timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                    data_source TEXT NOT NULL,
                    query_complexity TEXT NOT NULL,
                    dataset TEXT NOT NULL,
                    duration DOUBLE PRECISION NOT NULL
                )",
                QUERY_LOG_TABLE
            ))
            .await
            .map_err(|e| LogSinkError::Unavailable(format!("Cannot create {}: {}", QUERY_LOG_TABLE, e)))?;
        info!(target_db = %self.target, "query log table ready");
        Ok(())
    }

    async fn append(&self, entry: &LogEntry) -> BenchResult<QueryLogRecord> {
        let client = self.ready_client().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO {} (data_source, query_complexity, dataset, duration)
                     VALUES ($1, $2, $3, $4)
                     RETURNING id, timestamp",
                    QUERY_LOG_TABLE
                ),
                &[
                    &entry.data_source.label(),
                    &entry.query_complexity.label(),
                    &entry.dataset.label(),
                    &entry.duration,
                ],
            )
            .await
            .map_err(|e| LogSinkError::WriteFailed(e.to_string()))?;

        let id: i32 = row.try_get(0).map_err(|e| LogSinkError::WriteFailed(e.to_string()))?;
        let timestamp: DateTime<Utc> = row.try_get(1).map_err(|e| LogSinkError::WriteFailed(e.to_string()))?;

        Ok(QueryLogRecord {
            id: id as i64,
            timestamp,
            data_source: entry.data_source,
            query_complexity: entry.query_complexity,
            dataset: entry.dataset,
            duration: entry.duration,
        })
    }

    async fn read_all(&self) -> BenchResult<Vec<QueryLogRecord>> {
        let client = self.ready_client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT id, timestamp, data_source, query_complexity, dataset, duration
                     FROM {} ORDER BY id",
                    QUERY_LOG_TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| LogSinkError::ReadFailed(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let read_failed = |e: tokio_postgres::Error| LogSinkError::ReadFailed(e.to_string());
                let id: i32 = row.try_get(0).map_err(read_failed)?;
                let timestamp: DateTime<Utc> = row.try_get(1).map_err(read_failed)?;
                let data_source: String = row.try_get(2).map_err(read_failed)?;
                let complexity: String = row.try_get(3).map_err(read_failed)?;
                let dataset: String = row.try_get(4).map_err(read_failed)?;
                let duration: f64 = row.try_get(5).map_err(read_failed)?;
                record_from_labels(id as i64, timestamp, &data_source, &complexity, &dataset, duration)
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!("PostgreSQL ({}/{})", self.target, QUERY_LOG_TABLE)
    }
}

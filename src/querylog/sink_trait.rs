use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::utils::{
    error::{BenchResult, LogSinkError},
    types::{Backend, Complexity, Dataset, LogEntry, QueryLogRecord},
};

/// Name of the log table in every store
pub const QUERY_LOG_TABLE: &str = "query_logs";

/// Append-only store of query timings
#[async_trait]
pub trait QueryLogSink: Send + Sync {
    /// Create the log table if it does not exist
    async fn ensure_table(&self) -> BenchResult<()>;

    /// Append one record; the store assigns id and timestamp
    async fn append(&self, entry: &LogEntry) -> BenchResult<QueryLogRecord>;

    /// Every record, ordered by id
    async fn read_all(&self) -> BenchResult<Vec<QueryLogRecord>>;

    fn describe(&self) -> String;
}

/// Rebuild a record from the labels stored in a log row
pub(crate) fn record_from_labels(
    id: i64,
    timestamp: DateTime<Utc>,
    data_source: &str,
    query_complexity: &str,
    dataset: &str,
    duration: f64,
) -> BenchResult<QueryLogRecord> {
    let unreadable = |what: &str, value: &str| LogSinkError::ReadFailed(format!("record {} has unknown {} '{}'", id, what, value));

    Ok(QueryLogRecord {
        id,
        timestamp,
        data_source: data_source
            .parse::<Backend>()
            .map_err(|_| unreadable("data source", data_source))?,
        query_complexity: query_complexity
            .parse::<Complexity>()
            .map_err(|_| unreadable("complexity", query_complexity))?,
        dataset: dataset.parse::<Dataset>().map_err(|_| unreadable("dataset", dataset))?,
        duration,
    })
}

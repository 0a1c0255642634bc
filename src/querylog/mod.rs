// Query timing log
pub mod sink_trait;
pub mod sqlite_sink;
pub mod postgres_sink;

pub use sink_trait::{QueryLogSink, QUERY_LOG_TABLE};
pub use sqlite_sink::SqliteLogSink;
pub use postgres_sink::PostgresLogSink;

use std::sync::Arc;

use crate::utils::{config::QueryLogConfig, error::BenchResult};

/// Open the sink a configuration names
pub fn open_sink(config: &QueryLogConfig) -> BenchResult<Arc<dyn QueryLogSink>> {
    Ok(match config {
        QueryLogConfig::Sqlite { path } => Arc::new(SqliteLogSink::open(path)?),
        QueryLogConfig::Postgres(pg) => Arc::new(PostgresLogSink::new(pg)?),
    })
}

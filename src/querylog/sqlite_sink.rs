use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::querylog::sink_trait::{record_from_labels, QueryLogSink, QUERY_LOG_TABLE};
use crate::utils::{
    error::{BenchError, BenchResult, LogSinkError},
    types::{LogEntry, QueryLogRecord},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Query log in an embedded SQLite file.
///
/// The database runs in WAL mode with a busy timeout, so several benchmark
/// processes can append to the same file.
pub struct SqliteLogSink {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteLogSink {
    pub fn open(path: &Path) -> BenchResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LogSinkError::Unavailable(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LogSinkError::Unavailable(format!("Cannot open {}: {}", path.display(), e)))?;
        // The busy handler must be in place before the first statement that takes a lock
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| LogSinkError::Unavailable(format!("Cannot set busy timeout: {}", e)))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| LogSinkError::Unavailable(format!("Cannot enable WAL: {}", e)))?;

        Self::init(conn, path.display().to_string())
    }

    /// Private database for tests and dry runs
    pub fn in_memory() -> BenchResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LogSinkError::Unavailable(format!("Cannot open in-memory database: {}", e)))?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> BenchResult<Self> {
        create_table(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }

    async fn with_connection<T, F>(&self, f: F) -> BenchResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> BenchResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| BenchError::Internal("SQLite connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| BenchError::Internal(format!("Query log task panicked: {}", e)))?
    }
}

fn create_table(conn: &Connection) -> BenchResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data_source TEXT NOT NULL,
            query_complexity TEXT NOT NULL,
            dataset TEXT NOT NULL,
            duration REAL NOT NULL
        )",
        QUERY_LOG_TABLE
    ))
    .map_err(|e| LogSinkError::Unavailable(format!("Cannot create {}: {}", QUERY_LOG_TABLE, e)).into())
}

#[async_trait]
impl QueryLogSink for SqliteLogSink {
    async fn ensure_table(&self) -> BenchResult<()> {
        self.with_connection(create_table).await
    }

    async fn append(&self, entry: &LogEntry) -> BenchResult<QueryLogRecord> {
        let entry = entry.clone();
        self.with_connection(move |conn| {
            let timestamp = Utc::now();
            conn.execute(
                &format!(
                    "INSERT INTO {} (timestamp, data_source, query_complexity, dataset, duration)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    QUERY_LOG_TABLE
                ),
                params![
                    timestamp.to_rfc3339(),
                    entry.data_source.label(),
                    entry.query_complexity.label(),
                    entry.dataset.label(),
                    entry.duration
                ],
            )
            .map_err(|e| LogSinkError::WriteFailed(e.to_string()))?;

            Ok(QueryLogRecord {
                id: conn.last_insert_rowid(),
                timestamp,
                data_source: entry.data_source,
                query_complexity: entry.query_complexity,
                dataset: entry.dataset,
                duration: entry.duration,
            })
        })
        .await
    }

    async fn read_all(&self) -> BenchResult<Vec<QueryLogRecord>> {
        self.with_connection(|conn| {
            let read_failed = |e: rusqlite::Error| BenchError::from(LogSinkError::ReadFailed(e.to_string()));

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, timestamp, data_source, query_complexity, dataset, duration
                     FROM {} ORDER BY id",
                    QUERY_LOG_TABLE
                ))
                .map_err(read_failed)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, f64>(5)?,
                    ))
                })
                .map_err(read_failed)?;

            let mut records = Vec::new();
            for row in rows {
                let (id, timestamp, data_source, complexity, dataset, duration) = row.map_err(read_failed)?;
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| LogSinkError::ReadFailed(format!("record {} has a bad timestamp: {}", id, e)))?
                    .with_timezone(&Utc);
                records.push(record_from_labels(id, timestamp, &data_source, &complexity, &dataset, duration)?);
            }
            Ok(records)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("SQLite ({})", self.location)
    }
}

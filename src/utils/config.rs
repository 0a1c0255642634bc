use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::utils::error::{BenchError, BenchResult};

/// Main benchmark configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchConfig {
    pub flat_file: FlatFileConfig,
    pub relational: PostgresConfig,
    pub document: DocumentStoreConfig,
    pub query_log: QueryLogConfig,
}

/// Flat-file sources, keyed by the source name used in frame plans
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlatFileConfig {
    pub sources: HashMap<String, PathBuf>,
    pub delimiter: char,
    /// Columns dropped on load
    pub drop_columns: Vec<String>,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub max_connections: u32,
    pub connect_timeout: u64, // seconds
}

/// Where the document backend reads from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentStoreConfig {
    Mongo { uri: String, database: String },
    /// JSON files holding an array of documents, keyed by collection name
    Local { collections: HashMap<String, PathBuf> },
}

/// Where query timings are logged
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryLogConfig {
    Sqlite { path: PathBuf },
    Postgres(PostgresConfig),
}

impl BenchConfig {
    /// Load configuration from a JSON file; missing sections take defaults
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: BenchConfig = serde_json::from_str(&content)
            .map_err(|e| BenchError::Configuration(format!("Invalid config file {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchResult<()> {
        for (name, path) in &self.flat_file.sources {
            if path.as_os_str().is_empty() {
                return Err(BenchError::Configuration(format!("Flat-file source '{}' has an empty path", name)));
            }
        }

        self.relational.validate()?;

        match &self.document {
            DocumentStoreConfig::Mongo { uri, database } => {
                if uri.is_empty() || database.is_empty() {
                    return Err(BenchError::Configuration(
                        "Document store requires a uri and a database".to_string(),
                    ));
                }
            }
            DocumentStoreConfig::Local { collections } => {
                if collections.values().any(|p| p.as_os_str().is_empty()) {
                    return Err(BenchError::Configuration(
                        "Local document collection has an empty path".to_string(),
                    ));
                }
            }
        }

        match &self.query_log {
            QueryLogConfig::Sqlite { path } if path.as_os_str().is_empty() => Err(BenchError::Configuration(
                "Query log path must not be empty".to_string(),
            )),
            QueryLogConfig::Postgres(pg) => pg.validate(),
            _ => Ok(()),
        }
    }
}

impl PostgresConfig {
    fn validate(&self) -> BenchResult<()> {
        if self.host.is_empty() {
            return Err(BenchError::Configuration("PostgreSQL host must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(BenchError::Configuration("PostgreSQL pool size must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            flat_file: FlatFileConfig::default(),
            relational: PostgresConfig::default(),
            document: DocumentStoreConfig::default(),
            query_log: QueryLogConfig::default(),
        }
    }
}

impl Default for FlatFileConfig {
    fn default() -> Self {
        let mut sources = HashMap::new();
        sources.insert("census_data".to_string(), PathBuf::from("USCensus1990.data.txt"));
        Self {
            sources,
            delimiter: ',',
            drop_columns: vec!["caseid".to_string()],
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "user".to_string(),
            password: "password".to_string(),
            dbname: "demo_db".to_string(),
            max_connections: 4,
            connect_timeout: 10,
        }
    }
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        DocumentStoreConfig::Mongo {
            uri: "mongodb://localhost:27017/".to_string(),
            database: "demo_db".to_string(),
        }
    }
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        QueryLogConfig::Sqlite {
            path: PathBuf::from("query_logs.db"),
        }
    }
}

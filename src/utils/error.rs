use thiserror::Error;

use crate::utils::types::{Backend, Complexity, Dataset};

/// Main error type for dbbench
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Query log error: {0}")]
    LogSink(#[from] LogSinkError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Query catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{backend} does not support the {dataset} dataset ({complexity} query)")]
    Unsupported {
        dataset: Dataset,
        backend: Backend,
        complexity: Complexity,
    },

    #[error("Catalog is incomplete: {0}")]
    Incomplete(String),

    #[error("Duplicate catalog entry: {0}")]
    Duplicate(String),
}

/// Backend executor errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Invalid query parameters: {0}")]
    InvalidParameters(String),
}

/// Query log sink errors
#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("Query log store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to append query log record: {0}")]
    WriteFailed(String),

    #[error("Failed to read query log: {0}")]
    ReadFailed(String),
}

impl BenchError {
    /// The requested (dataset, backend) combination has no descriptor
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BenchError::Catalog(CatalogError::Unsupported { .. }))
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, BenchError::Connector(ConnectorError::BackendUnavailable(_)))
    }

    pub fn is_query_failure(&self) -> bool {
        matches!(self, BenchError::Connector(ConnectorError::QueryFailed(_)))
    }
}

/// Result type alias for dbbench operations
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_error_from_catalog_error() {
        let catalog_error = CatalogError::Unsupported {
            dataset: Dataset::Ecommerce,
            backend: Backend::FlatFile,
            complexity: Complexity::Simple,
        };
        let error: BenchError = catalog_error.into();

        assert!(error.is_unsupported());
        assert!(!error.is_backend_unavailable());
        assert_eq!(
            error.to_string(),
            "Catalog error: Flat File does not support the E-commerce Data dataset (Simple query)"
        );
    }

    #[test]
    fn test_bench_error_from_connector_error() {
        let error: BenchError = ConnectorError::BackendUnavailable("connection refused".to_string()).into();

        match &error {
            BenchError::Connector(ConnectorError::BackendUnavailable(msg)) => {
                assert_eq!(msg, "connection refused");
            }
            _ => panic!("Expected Connector error"),
        }
        assert!(error.is_backend_unavailable());
    }

    #[test]
    fn test_bench_error_from_log_sink_error() {
        let error: BenchError = LogSinkError::WriteFailed("disk full".to_string()).into();
        assert!(error.to_string().contains("Failed to append query log record: disk full"));
    }

    #[test]
    fn test_bench_result_type() {
        let failure: BenchResult<()> = Err(BenchError::Configuration("missing path".to_string()));

        match failure {
            Err(BenchError::Configuration(msg)) => assert_eq!(msg, "missing path"),
            _ => panic!("Expected Configuration error"),
        }
    }
}

//! Bulk loading of benchmark datasets into the relational and document
//! backends. A load is timed end to end, from reading the input file to the
//! last committed row.

pub mod relational;

pub use relational::RelationalLoader;

use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

use crate::executors::{local_store::read_documents, DocumentStore};
use crate::generator::Product;
use crate::utils::{
    config::FlatFileConfig,
    error::{BenchError, BenchResult},
    types::{Backend, Dataset},
};

pub const CENSUS_TABLE: &str = "census_data";
pub const PRODUCTS_COLLECTION: &str = "products";

/// Integer census columns read from a delimited file
#[derive(Debug, Clone, PartialEq)]
pub struct CensusTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<i64>>,
}

impl CensusTable {
    /// Read a census extract, dropping the columns the flat-file backend drops
    pub fn read(path: &Path, config: &FlatFileConfig) -> BenchResult<Self> {
        if !config.delimiter.is_ascii() {
            return Err(BenchError::Configuration(format!(
                "Delimiter '{}' is not a single-byte character",
                config.delimiter
            )));
        }
        let unreadable = |e: csv::Error| BenchError::Configuration(format!("Cannot read {}: {}", path.display(), e));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter as u8)
            .from_path(path)
            .map_err(unreadable)?;
        let headers = reader.headers().map_err(unreadable)?.clone();
        let kept: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !config.drop_columns.iter().any(|d| d == name))
            .map(|(i, _)| i)
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            let row = kept
                .iter()
                .map(|&i| {
                    let field = record.get(i).unwrap_or("").trim();
                    field.parse::<i64>().map_err(|_| {
                        BenchError::Configuration(format!(
                            "{} line {}: column '{}' holds '{}', not an integer",
                            path.display(),
                            line + 2,
                            &headers[i],
                            field
                        ))
                    })
                })
                .collect::<BenchResult<Vec<_>>>()?;
            rows.push(row);
        }

        Ok(Self {
            columns: kept.iter().map(|&i| headers[i].to_string()).collect(),
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One flat document per row
    pub fn to_documents(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|row| {
                JsonValue::Object(
                    self.columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(|v| JsonValue::from(*v)))
                        .collect(),
                )
            })
            .collect()
    }
}

/// Read product documents written by `generate` (JSON array or JSON lines)
pub fn read_products(path: &Path) -> BenchResult<Vec<Product>> {
    read_documents(path)?
        .into_iter()
        .enumerate()
        .map(|(i, document)| {
            serde_json::from_value(document).map_err(|e| {
                BenchError::Configuration(format!("{}: document {} is not a product: {}", path.display(), i + 1, e))
            })
        })
        .collect()
}

/// Outcome of one load
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub dataset: Dataset,
    pub backend: Backend,
    pub target: String,
    pub records: usize,
    /// Rows written to companion tables (product reviews)
    pub related: usize,
    pub duration: Duration,
}

impl LoadReport {
    pub fn message(&self) -> String {
        let related = if self.related > 0 {
            format!(" and {} reviews", self.related)
        } else {
            String::new()
        };
        format!(
            "Loaded {} {} records{} into {} in {:.2} seconds",
            self.records,
            self.dataset,
            related,
            self.target,
            self.duration.as_secs_f64()
        )
    }
}

/// Insert a dataset into a document store: census rows as flat documents in
/// `census_data`, products with embedded reviews in `products`
pub async fn load_documents(
    store: &dyn DocumentStore,
    dataset: Dataset,
    input: &Path,
    flat_file: &FlatFileConfig,
) -> BenchResult<LoadReport> {
    let start = Instant::now();
    let (collection, documents) = match dataset {
        Dataset::Census => (CENSUS_TABLE, CensusTable::read(input, flat_file)?.to_documents()),
        Dataset::Ecommerce => {
            let documents = read_products(input)?
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BenchError::Internal(format!("Cannot encode product: {}", e)))?;
            (PRODUCTS_COLLECTION, documents)
        }
    };

    let records = store.insert(collection, documents).await?;
    let report = LoadReport {
        dataset,
        backend: Backend::Document,
        target: format!("{} ({})", store.describe(), collection),
        records,
        related: 0,
        duration: start.elapsed(),
    };
    info!(%dataset, records, seconds = report.duration.as_secs_f64(), "document load finished");
    Ok(report)
}

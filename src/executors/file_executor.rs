use async_trait::async_trait;
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::engine::catalog::{Aggregate, Comparison, FramePlan, QueryDescriptor, QuerySpec};
use crate::executors::executor_trait::{ensure_backend, BackendExecutor};
use crate::utils::{
    config::FlatFileConfig,
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, ColumnMetadata, DataType, FilterParams, ParamValue, ResultTable, Row, Value},
};

/// One column of a parsed file, stored with a single inferred type.
///
/// Columns start as integers and are promoted to floats, then to text, as
/// fields that do not fit are encountered. Empty numeric fields are NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    fn push(&mut self, field: &str) {
        match self {
            ColumnData::Integer(values) => {
                if let Ok(v) = field.parse::<i64>() {
                    values.push(v);
                } else if field.is_empty() || field.parse::<f64>().is_ok() {
                    let mut floats: Vec<f64> = values.iter().map(|v| *v as f64).collect();
                    floats.push(field.parse::<f64>().unwrap_or(f64::NAN));
                    *self = ColumnData::Float(floats);
                } else {
                    let mut texts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    texts.push(field.to_string());
                    *self = ColumnData::Text(texts);
                }
            }
            ColumnData::Float(values) => {
                if field.is_empty() {
                    values.push(f64::NAN);
                } else if let Ok(v) = field.parse::<f64>() {
                    values.push(v);
                } else {
                    let mut texts: Vec<String> = values
                        .iter()
                        .map(|v| if v.is_nan() { String::new() } else { v.to_string() })
                        .collect();
                    texts.push(field.to_string());
                    *self = ColumnData::Text(texts);
                }
            }
            ColumnData::Text(values) => values.push(field.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Integer(_) => DataType::Integer,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Text(_) => DataType::Text,
        }
    }

    fn number(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Integer(v) => Some(v[row] as f64),
            ColumnData::Float(v) if !v[row].is_nan() => Some(v[row]),
            _ => None,
        }
    }

    fn key(&self, row: usize) -> GroupValue {
        match self {
            ColumnData::Integer(v) => GroupValue::Integer(v[row]),
            ColumnData::Float(v) if v[row].is_nan() => GroupValue::Null,
            ColumnData::Float(v) => GroupValue::Text(v[row].to_string()),
            ColumnData::Text(v) => GroupValue::Text(v[row].clone()),
        }
    }

    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Integer(v) => Value::Integer(v[row]),
            ColumnData::Float(v) if v[row].is_nan() => Value::Null,
            ColumnData::Float(v) => Value::Float(v[row]),
            ColumnData::Text(v) => Value::Text(v[row].clone()),
        }
    }
}

/// Orderable grouping value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GroupValue {
    Null,
    Integer(i64),
    Text(String),
}

impl GroupValue {
    fn into_value(self) -> Value {
        match self {
            GroupValue::Null => Value::Null,
            GroupValue::Integer(i) => Value::Integer(i),
            GroupValue::Text(s) => Value::Text(s),
        }
    }
}

/// A delimited file held in memory column by column
#[derive(Debug)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    row_count: usize,
}

impl Frame {
    /// Parse a header-bearing delimited source, skipping `drop_columns`
    pub fn from_reader<R: Read>(reader: R, delimiter: u8, drop_columns: &[String]) -> BenchResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| ConnectorError::QueryFailed(format!("Failed to read headers: {}", e)))?
            .clone();

        let keep: Vec<bool> = headers.iter().map(|h| !drop_columns.iter().any(|d| d == h)).collect();
        let names: Vec<String> = headers
            .iter()
            .zip(keep.iter())
            .filter(|(_, keep)| **keep)
            .map(|(h, _)| h.to_string())
            .collect();
        let mut columns: Vec<ColumnData> = names.iter().map(|_| ColumnData::Integer(Vec::new())).collect();

        let mut row_count = 0;
        for result in reader.records() {
            let record =
                result.map_err(|e| ConnectorError::QueryFailed(format!("Failed to read record: {}", e)))?;

            let mut target = 0;
            for (field, keep) in record.iter().zip(keep.iter()) {
                if *keep {
                    columns[target].push(field);
                    target += 1;
                }
            }
            row_count += 1;
        }

        Ok(Self {
            names,
            columns,
            row_count,
        })
    }

    pub fn load(path: &Path, delimiter: u8, drop_columns: &[String]) -> BenchResult<Self> {
        let file = File::open(path).map_err(|e| {
            ConnectorError::BackendUnavailable(format!("Cannot open flat file {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file), delimiter, drop_columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    fn require(&self, name: &str) -> BenchResult<&ColumnData> {
        self.column(name)
            .ok_or_else(|| ConnectorError::QueryFailed(format!("Column '{}' not found", name)).into())
    }
}

/// A predicate with its column and value resolved
enum BoundFilter<'a> {
    Range {
        column: &'a ColumnData,
        comparison: Comparison,
        bound: f64,
    },
    InNumbers {
        column: &'a ColumnData,
        set: Vec<f64>,
    },
    InText {
        column: &'a ColumnData,
        set: Vec<String>,
    },
}

impl BoundFilter<'_> {
    fn matches(&self, row: usize) -> bool {
        match self {
            BoundFilter::Range { column, comparison, bound } => match column.number(row) {
                Some(v) if *comparison == Comparison::Gte => v >= *bound,
                Some(v) => v <= *bound,
                None => false,
            },
            BoundFilter::InNumbers { column, set } => column
                .number(row)
                .map(|v| set.iter().any(|s| *s == v))
                .unwrap_or(false),
            BoundFilter::InText { column, set } => match column.key(row) {
                GroupValue::Text(v) => set.iter().any(|s| *s == v),
                _ => false,
            },
        }
    }
}

#[derive(Default)]
struct GroupAccumulator {
    rows: i64,
    sums: Vec<f64>,
    counts: Vec<i64>,
}

/// Filter, group and aggregate a frame according to a plan. Groups are
/// returned in ascending key order.
pub fn run_plan(frame: &Frame, plan: &FramePlan, params: &FilterParams) -> BenchResult<ResultTable> {
    let mut filters = Vec::with_capacity(plan.predicates.len());
    for predicate in &plan.predicates {
        let column = frame.require(&predicate.field)?;
        let value = params.bind(predicate.slot)?;
        let filter = match (predicate.comparison, value) {
            (Comparison::In, ParamValue::IntegerList(list)) => BoundFilter::InNumbers {
                column,
                set: list.into_iter().map(|v| v as f64).collect(),
            },
            (Comparison::In, ParamValue::TextList(set)) => BoundFilter::InText { column, set },
            (comparison @ (Comparison::Gte | Comparison::Lte), value) => {
                let bound = value.as_f64().ok_or_else(|| {
                    ConnectorError::InvalidParameters(format!("'{}' needs a numeric value", predicate.slot.name()))
                })?;
                BoundFilter::Range { column, comparison, bound }
            }
            (Comparison::In, _) => {
                return Err(ConnectorError::InvalidParameters(format!(
                    "'{}' needs a list value",
                    predicate.slot.name()
                ))
                .into())
            }
        };
        filters.push(filter);
    }

    let key_columns: Vec<&ColumnData> = plan
        .group_by
        .iter()
        .map(|name| frame.require(name))
        .collect::<BenchResult<_>>()?;

    let mut measure_columns: Vec<Option<&ColumnData>> = Vec::with_capacity(plan.aggregates.len());
    for aggregate in &plan.aggregates {
        match aggregate {
            Aggregate::Count { .. } => measure_columns.push(None),
            Aggregate::Mean { field, .. } => {
                let column = frame.require(field)?;
                if column.data_type() == DataType::Text {
                    return Err(ConnectorError::QueryFailed(format!("Cannot average text column '{}'", field)).into());
                }
                measure_columns.push(Some(column));
            }
        }
    }

    let mut groups: BTreeMap<Vec<GroupValue>, GroupAccumulator> = BTreeMap::new();
    for row in 0..frame.row_count() {
        if !filters.iter().all(|f| f.matches(row)) {
            continue;
        }

        let key: Vec<GroupValue> = key_columns.iter().map(|c| c.key(row)).collect();
        let acc = groups.entry(key).or_insert_with(|| GroupAccumulator {
            rows: 0,
            sums: vec![0.0; measure_columns.len()],
            counts: vec![0; measure_columns.len()],
        });
        acc.rows += 1;
        for (i, column) in measure_columns.iter().enumerate() {
            if let Some(v) = column.and_then(|c| c.number(row)) {
                acc.sums[i] += v;
                acc.counts[i] += 1;
            }
        }
    }

    let mut columns: Vec<ColumnMetadata> = plan
        .group_by
        .iter()
        .zip(key_columns.iter())
        .map(|(name, column)| {
            let data_type = match column.data_type() {
                DataType::Integer => DataType::Integer,
                _ => DataType::Text,
            };
            ColumnMetadata::new(name, data_type)
        })
        .collect();
    for aggregate in &plan.aggregates {
        let data_type = match aggregate {
            Aggregate::Count { .. } => DataType::Integer,
            Aggregate::Mean { .. } => DataType::Float,
        };
        columns.push(ColumnMetadata::new(aggregate.alias(), data_type));
    }

    let rows = groups
        .into_iter()
        .map(|(key, acc)| {
            let mut values: Vec<Value> = key.into_iter().map(GroupValue::into_value).collect();
            for (i, aggregate) in plan.aggregates.iter().enumerate() {
                values.push(match aggregate {
                    Aggregate::Count { .. } => Value::Integer(acc.rows),
                    Aggregate::Mean { .. } if acc.counts[i] == 0 => Value::Null,
                    Aggregate::Mean { .. } => Value::Float(acc.sums[i] / acc.counts[i] as f64),
                });
            }
            Row::new(values)
        })
        .collect();

    Ok(ResultTable::new(columns, rows))
}

struct FlatFileSource {
    path: PathBuf,
    frame: OnceCell<Arc<Frame>>,
}

/// Flat-file executor: loads each source once per process, then scans it in
/// memory for every query
pub struct FlatFileExecutor {
    sources: HashMap<String, FlatFileSource>,
    delimiter: u8,
    drop_columns: Vec<String>,
}

impl FlatFileExecutor {
    pub fn new(config: &FlatFileConfig) -> BenchResult<Self> {
        if !config.delimiter.is_ascii() {
            return Err(BenchError::Configuration(format!(
                "Delimiter '{}' is not a single-byte character",
                config.delimiter
            )));
        }

        let mut executor = Self {
            sources: HashMap::new(),
            delimiter: config.delimiter as u8,
            drop_columns: config.drop_columns.clone(),
        };
        for (name, path) in &config.sources {
            executor = executor.with_source(name, path);
        }
        Ok(executor)
    }

    /// Add or replace a named source
    pub fn with_source(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(
            name.to_string(),
            FlatFileSource {
                path: path.into(),
                frame: OnceCell::new(),
            },
        );
        self
    }

    /// Whether the named source has been loaded into memory
    pub fn is_loaded(&self, source: &str) -> bool {
        self.sources.get(source).map(|s| s.frame.initialized()).unwrap_or(false)
    }

    /// Get the cached frame for a source, loading it on first use
    pub async fn frame(&self, source: &str) -> BenchResult<Arc<Frame>> {
        let entry = self.sources.get(source).ok_or_else(|| {
            ConnectorError::BackendUnavailable(format!("No flat file configured for source '{}'", source))
        })?;

        let frame = entry
            .frame
            .get_or_try_init(|| async {
                let path = entry.path.clone();
                let delimiter = self.delimiter;
                let drop_columns = self.drop_columns.clone();
                info!(source = source, path = %path.display(), "loading flat file");

                let frame = tokio::task::spawn_blocking(move || Frame::load(&path, delimiter, &drop_columns))
                    .await
                    .map_err(|e| BenchError::Internal(format!("Flat file loader panicked: {}", e)))??;

                info!(source = source, rows = frame.row_count(), "flat file loaded");
                Ok::<_, BenchError>(Arc::new(frame))
            })
            .await?;

        Ok(frame.clone())
    }
}

#[async_trait]
impl BackendExecutor for FlatFileExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor, params: &FilterParams) -> BenchResult<ResultTable> {
        ensure_backend(Backend::FlatFile, descriptor)?;
        let QuerySpec::Frame(plan) = &descriptor.query else {
            return Err(ConnectorError::QueryFailed("Flat-file executor needs a frame plan".to_string()).into());
        };

        let frame = self.frame(&plan.source).await?;
        debug!(source = %plan.source, rows = frame.row_count(), "scanning flat file");

        let plan = plan.clone();
        let params = params.clone();
        tokio::task::spawn_blocking(move || run_plan(&frame, &plan, &params))
            .await
            .map_err(|e| BenchError::Internal(format!("Flat file scan panicked: {}", e)))?
    }

    fn backend(&self) -> Backend {
        Backend::FlatFile
    }

    fn describe(&self) -> String {
        let mut names: Vec<&String> = self.sources.keys().collect();
        names.sort();
        format!(
            "Flat File ({})",
            names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
        )
    }
}

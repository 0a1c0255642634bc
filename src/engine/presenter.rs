//! Turns executor output into chart specifications.
//!
//! Backends name their output columns differently: documents carry grouping
//! keys in `_id`, sometimes as an object. `normalize` maps every result onto
//! the canonical layout of its (dataset, tier) so charts and comparisons do
//! not depend on the backend that produced the rows.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

use crate::engine::catalog::tier_shape;
use crate::utils::{
    error::{BenchError, BenchResult},
    types::{Backend, ColumnMetadata, Complexity, DataType, Dataset, QueryLogRecord, ResultTable, Row, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    Box,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: JsonValue,
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<JsonValue>,
}

/// Renderer-agnostic chart description
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Axis and legend captions keyed by column name
    pub labels: BTreeMap<String, String>,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    NoResults,
    Chart(ChartSpec),
}

/// Duration statistics in milliseconds for one (data source, complexity) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationSummary {
    pub data_source: Backend,
    pub query_complexity: Complexity,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; absent for a single observation
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

/// Query log view for one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogReport {
    pub dataset: Dataset,
    pub chart: ChartSpec,
    pub summary: Vec<DurationSummary>,
}

fn axis_label(column: &str) -> &'static str {
    match column {
        "iSex" => "Sex",
        "iMarital" => "Marital Status",
        "count" => "Count",
        "avg_income" | "mean" => "Average Income",
        "category" => "Category",
        "color" => "Color",
        "average_price" => "Average Price",
        "average_rating" => "Average Rating",
        "data_source" => "Data Source",
        "query_complexity" => "Query Complexity",
        "duration_ms" => "Duration (milliseconds)",
        _ => "Value",
    }
}

enum Source {
    Column(usize),
    IdField(usize, &'static str),
}

/// Rewrite a result table into the canonical keys-then-measures layout
pub fn normalize(dataset: Dataset, complexity: Complexity, table: &ResultTable) -> BenchResult<ResultTable> {
    let shape = tier_shape(dataset, complexity);
    if table.is_empty() {
        // Document stores return no columns at all for an empty result
        let columns = shape
            .keys
            .iter()
            .map(|name| (name, DataType::Text))
            .chain(shape.measures.iter().map(|name| (name, DataType::Float)))
            .map(|(name, fallback)| {
                let data_type = table
                    .column_index(name)
                    .map(|i| table.columns[i].data_type)
                    .unwrap_or(fallback);
                ColumnMetadata::new(name, data_type)
            })
            .collect();
        return Ok(ResultTable::new(columns, Vec::new()));
    }

    let id_index = table.column_index("_id");
    let missing = |name: &str| BenchError::Internal(format!("Result has no '{}' column", name));

    let mut sources = Vec::new();
    for key in shape.keys {
        let source = match (table.column_index(key), id_index) {
            (Some(i), _) => Source::Column(i),
            (None, Some(i)) if shape.keys.len() == 1 => Source::Column(i),
            (None, Some(i)) => Source::IdField(i, *key),
            (None, None) => return Err(missing(*key)),
        };
        sources.push(source);
    }
    for measure in shape.measures {
        sources.push(Source::Column(table.column_index(measure).ok_or_else(|| missing(*measure))?));
    }

    let rows: Vec<Row> = table
        .rows
        .iter()
        .map(|row| {
            Row::new(
                sources
                    .iter()
                    .map(|source| match source {
                        Source::Column(i) => row.get(*i).cloned().unwrap_or(Value::Null),
                        Source::IdField(i, key) => id_field(row.get(*i), key),
                    })
                    .collect(),
            )
        })
        .collect();

    let columns = shape
        .keys
        .iter()
        .chain(shape.measures.iter())
        .zip(sources.iter())
        .enumerate()
        .map(|(position, (name, source))| {
            let observed = rows
                .iter()
                .filter_map(|r| r.get(position))
                .find(|v| **v != Value::Null)
                .map(Value::data_type);
            let data_type = match (observed, source) {
                (Some(data_type), _) => data_type,
                (None, Source::Column(i)) => table.columns[*i].data_type,
                (None, Source::IdField(..)) => DataType::Text,
            };
            ColumnMetadata::new(name, data_type)
        })
        .collect();

    Ok(ResultTable::new(columns, rows))
}

fn id_field(id: Option<&Value>, key: &str) -> Value {
    match id {
        Some(Value::Json(raw)) => serde_json::from_str::<JsonValue>(raw)
            .ok()
            .and_then(|object| object.get(key).map(Value::from_json))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Chart a result table, or report that there is nothing to show
pub fn present(dataset: Dataset, complexity: Complexity, table: &ResultTable) -> BenchResult<Presentation> {
    let table = normalize(dataset, complexity, table)?;
    if table.is_empty() {
        return Ok(Presentation::NoResults);
    }

    let shape = tier_shape(dataset, complexity);
    let (kind, x, y, series) = match (dataset, complexity) {
        (Dataset::Census, Complexity::Complex) => (ChartKind::GroupedBar, "iMarital", "mean", Some("iSex")),
        (Dataset::Ecommerce, Complexity::Complex) => {
            (ChartKind::GroupedBar, "color", "average_rating", Some("category"))
        }
        _ => (ChartKind::Bar, shape.keys[0], shape.measures[0], None),
    };

    let column = |name: &str| {
        table
            .column_index(name)
            .ok_or_else(|| BenchError::Internal(format!("Missing column {}", name)))
    };
    let x_index = column(x)?;
    let y_index = column(y)?;
    let series_index = series.map(column).transpose()?;

    let points = table
        .rows
        .iter()
        .map(|row| ChartPoint {
            x: row.get(x_index).map(Value::to_json).unwrap_or(JsonValue::Null),
            y: row.get(y_index).and_then(Value::as_f64),
            series: series_index.map(|i| row.get(i).map(Value::to_json).unwrap_or(JsonValue::Null)),
        })
        .collect();

    let mut labels = BTreeMap::new();
    for name in [Some(x), Some(y), series].into_iter().flatten() {
        labels.insert(name.to_string(), axis_label(name).to_string());
    }

    Ok(Presentation::Chart(ChartSpec {
        kind,
        title: format!("{} by {} ({}, {})", axis_label(y), axis_label(x), dataset, complexity),
        x: x.to_string(),
        y: y.to_string(),
        series: series.map(str::to_string),
        labels,
        points,
    }))
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

fn summarize(data_source: Backend, query_complexity: Complexity, mut durations: Vec<f64>) -> DurationSummary {
    durations.sort_by(|a, b| a.total_cmp(b));
    let count = durations.len();
    let mean = durations.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });

    DurationSummary {
        data_source,
        query_complexity,
        count,
        mean,
        std,
        min: durations[0],
        p25: quantile(&durations, 0.25),
        p50: quantile(&durations, 0.5),
        p75: quantile(&durations, 0.75),
        max: durations[count - 1],
    }
}

/// Per-dataset box charts and duration summaries, datasets in first-seen order
pub fn present_log(records: &[QueryLogRecord]) -> Vec<LogReport> {
    let mut datasets: Vec<Dataset> = Vec::new();
    for record in records {
        if !datasets.contains(&record.dataset) {
            datasets.push(record.dataset);
        }
    }

    datasets
        .into_iter()
        .map(|dataset| {
            let selected: Vec<&QueryLogRecord> = records.iter().filter(|r| r.dataset == dataset).collect();

            let mut groups: HashMap<(Backend, Complexity), Vec<f64>> = HashMap::new();
            for record in &selected {
                groups
                    .entry((record.data_source, record.query_complexity))
                    .or_default()
                    .push(record.duration_ms());
            }
            let mut summary: Vec<DurationSummary> = groups
                .into_iter()
                .map(|((backend, complexity), durations)| summarize(backend, complexity, durations))
                .collect();
            summary.sort_by_key(|s| (s.data_source, s.query_complexity));

            let points = selected
                .iter()
                .map(|r| ChartPoint {
                    x: JsonValue::from(r.data_source.label()),
                    y: Some(r.duration_ms()),
                    series: Some(JsonValue::from(r.query_complexity.label())),
                })
                .collect();
            let labels = ["data_source", "duration_ms", "query_complexity"]
                .iter()
                .map(|name| (name.to_string(), axis_label(name).to_string()))
                .collect();

            LogReport {
                dataset,
                chart: ChartSpec {
                    kind: ChartKind::Box,
                    title: format!("Query Execution Times by Data Source and Complexity ({})", dataset),
                    x: "data_source".to_string(),
                    y: "duration_ms".to_string(),
                    series: Some("query_complexity".to_string()),
                    labels,
                    points,
                },
                summary,
            }
        })
        .collect()
}

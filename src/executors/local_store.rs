//! Embedded document store for offline runs.
//!
//! Collections are JSON files holding either an array of documents or one
//! document per line. Pipelines are evaluated in process over the subset of
//! stage syntax the catalog emits: `$match` (`$gte`, `$lte`, `$gt`, `$lt`,
//! `$eq`, `$in`, dotted paths), `$unwind` and `$group` (`$sum`, `$avg`).

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::executors::document_executor::DocumentStore;
use crate::generator::write_json_lines;
use crate::utils::error::{BenchError, BenchResult, ConnectorError};

struct LocalCollection {
    path: Option<PathBuf>,
    documents: OnceCell<Arc<Vec<JsonValue>>>,
}

/// In-process document store
#[derive(Default)]
pub struct LocalDocumentStore {
    collections: HashMap<String, LocalCollection>,
}

impl LocalDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collections read lazily from JSON files
    pub fn from_files(collections: &HashMap<String, PathBuf>) -> Self {
        let collections = collections
            .iter()
            .map(|(name, path)| {
                (
                    name.clone(),
                    LocalCollection {
                        path: Some(path.clone()),
                        documents: OnceCell::new(),
                    },
                )
            })
            .collect();
        Self { collections }
    }

    /// Add an in-memory collection
    pub fn with_documents(mut self, name: &str, documents: Vec<JsonValue>) -> Self {
        self.collections.insert(
            name.to_string(),
            LocalCollection {
                path: None,
                documents: OnceCell::from(Arc::new(documents)),
            },
        );
        self
    }

    pub async fn documents(&self, name: &str) -> BenchResult<Arc<Vec<JsonValue>>> {
        let collection = self.collections.get(name).ok_or_else(|| {
            ConnectorError::BackendUnavailable(format!("No local collection named '{}'", name))
        })?;

        let documents = collection
            .documents
            .get_or_try_init(|| async {
                let Some(path) = collection.path.clone() else {
                    return Ok(Arc::new(Vec::new()));
                };
                let documents = tokio::task::spawn_blocking(move || read_documents(&path))
                    .await
                    .map_err(|e| BenchError::Internal(format!("Collection loader panicked: {}", e)))??;
                info!(collection = name, documents = documents.len(), "local collection loaded");
                Ok::<_, BenchError>(Arc::new(documents))
            })
            .await?;
        Ok(documents.clone())
    }
}

/// Read a JSON array, or newline-delimited JSON documents
pub fn read_documents(path: &Path) -> BenchResult<Vec<JsonValue>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConnectorError::BackendUnavailable(format!("Cannot read collection file {}: {}", path.display(), e))
    })?;
    let invalid =
        |e: serde_json::Error| ConnectorError::QueryFailed(format!("Invalid collection file {}: {}", path.display(), e));

    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&content).map_err(invalid)?);
    }
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| invalid(e).into()))
        .collect()
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn aggregate(&self, collection: &str, pipeline: &[JsonValue]) -> BenchResult<Vec<JsonValue>> {
        let documents = self.documents(collection).await?;
        let pipeline = pipeline.to_vec();
        tokio::task::spawn_blocking(move || run_pipeline(&documents, &pipeline))
            .await
            .map_err(|e| BenchError::Internal(format!("Pipeline evaluation panicked: {}", e)))?
    }

    /// Appends to the collection's file. A collection this store has already
    /// read keeps serving its cached copy.
    async fn insert(&self, collection: &str, documents: Vec<JsonValue>) -> BenchResult<usize> {
        let path = self
            .collections
            .get(collection)
            .and_then(|c| c.path.clone())
            .ok_or_else(|| {
                ConnectorError::BackendUnavailable(format!("No local collection file configured for '{}'", collection))
            })?;
        let count = documents.len();

        tokio::task::spawn_blocking(move || {
            let mut all = if path.exists() { read_documents(&path)? } else { Vec::new() };
            all.extend(documents);
            write_json_lines(&path, &all)
        })
        .await
        .map_err(|e| BenchError::Internal(format!("Collection writer panicked: {}", e)))??;

        info!(collection, count, "documents appended");
        Ok(count)
    }

    fn describe(&self) -> String {
        let mut names: Vec<&String> = self.collections.keys().collect();
        names.sort();
        format!(
            "local: {}",
            names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
        )
    }
}

fn unsupported(what: String) -> BenchError {
    ConnectorError::QueryFailed(what).into()
}

/// Evaluate a pipeline over a collection
pub fn run_pipeline(documents: &[JsonValue], pipeline: &[JsonValue]) -> BenchResult<Vec<JsonValue>> {
    let mut current: Option<Vec<JsonValue>> = None;
    for stage in pipeline {
        let input = current.as_deref().unwrap_or(documents);
        let (operator, spec) = match stage.as_object() {
            Some(object) if object.len() == 1 => match object.iter().next() {
                Some(entry) => entry,
                None => return Err(unsupported("Empty pipeline stage".to_string())),
            },
            _ => return Err(unsupported(format!("Malformed pipeline stage: {}", stage))),
        };

        let output = match operator.as_str() {
            "$match" => apply_match(input, spec)?,
            "$unwind" => apply_unwind(input, spec)?,
            "$group" => apply_group(input, spec)?,
            other => return Err(unsupported(format!("Unsupported pipeline stage {}", other))),
        };
        current = Some(output);
    }
    Ok(current.unwrap_or_else(|| documents.to_vec()))
}

fn lookup<'a>(document: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(document, |value, part| value.as_object()?.get(part))
}

fn set_path(document: &mut JsonValue, path: &str, value: JsonValue) {
    let mut target = document;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let JsonValue::Object(object) = target else { return };
        if parts.peek().is_none() {
            object.insert(part.to_string(), value);
            return;
        }
        target = object.entry(part.to_string()).or_insert_with(|| JsonValue::Object(Map::new()));
    }
}

fn field_path(spec: &JsonValue) -> BenchResult<&str> {
    spec.as_str()
        .and_then(|s| s.strip_prefix('$'))
        .ok_or_else(|| unsupported(format!("Expected a field path, got {}", spec)))
}

fn compare(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn equals(left: &JsonValue, right: &JsonValue) -> bool {
    compare(left, right) == Some(Ordering::Equal) || left == right
}

fn matches_condition(value: Option<&JsonValue>, condition: &JsonValue) -> BenchResult<bool> {
    let operators = match condition.as_object() {
        Some(object) if object.keys().all(|k| k.starts_with('$')) => object,
        _ => return Ok(value.map(|v| equals(v, condition)).unwrap_or(false)),
    };

    for (operator, operand) in operators {
        let Some(value) = value else { return Ok(false) };
        let passed = match operator.as_str() {
            "$eq" => equals(value, operand),
            "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
            "$gt" => compare(value, operand) == Some(Ordering::Greater),
            "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
            "$lt" => compare(value, operand) == Some(Ordering::Less),
            "$in" => {
                let candidates = operand
                    .as_array()
                    .ok_or_else(|| unsupported(format!("$in needs an array, got {}", operand)))?;
                candidates.iter().any(|c| equals(value, c))
            }
            other => return Err(unsupported(format!("Unsupported match operator {}", other))),
        };
        if !passed {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_match(input: &[JsonValue], spec: &JsonValue) -> BenchResult<Vec<JsonValue>> {
    let conditions = spec
        .as_object()
        .ok_or_else(|| unsupported(format!("$match needs an object, got {}", spec)))?;

    let mut output = Vec::new();
    for document in input {
        let mut keep = true;
        for (field, condition) in conditions {
            if !matches_condition(lookup(document, field), condition)? {
                keep = false;
                break;
            }
        }
        if keep {
            output.push(document.clone());
        }
    }
    Ok(output)
}

fn apply_unwind(input: &[JsonValue], spec: &JsonValue) -> BenchResult<Vec<JsonValue>> {
    let path = match spec.get("path") {
        Some(path) => field_path(path)?,
        None => field_path(spec)?,
    };

    let mut output = Vec::new();
    for document in input {
        match lookup(document, path) {
            Some(JsonValue::Array(elements)) => {
                for element in elements {
                    let mut copy = document.clone();
                    set_path(&mut copy, path, element.clone());
                    output.push(copy);
                }
            }
            None | Some(JsonValue::Null) => {}
            Some(_) => output.push(document.clone()),
        }
    }
    Ok(output)
}

/// Evaluate a group `_id` expression against one document
fn evaluate(document: &JsonValue, expression: &JsonValue) -> JsonValue {
    match expression {
        JsonValue::String(s) if s.starts_with('$') => lookup(document, &s[1..]).cloned().unwrap_or(JsonValue::Null),
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, expr)| (name.clone(), evaluate(document, expr)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

enum Accumulator {
    Sum { total: f64, integral: bool },
    Avg { total: f64, count: u64 },
}

impl Accumulator {
    fn add(&mut self, value: &JsonValue) {
        let Some(number) = value.as_f64() else { return };
        match self {
            Accumulator::Sum { total, integral } => {
                *total += number;
                *integral &= value.is_i64() || value.is_u64();
            }
            Accumulator::Avg { total, count } => {
                *total += number;
                *count += 1;
            }
        }
    }

    fn finish(&self) -> JsonValue {
        match self {
            Accumulator::Sum { total, integral: true } => JsonValue::from(*total as i64),
            Accumulator::Sum { total, .. } => JsonValue::from(*total),
            Accumulator::Avg { count: 0, .. } => JsonValue::Null,
            Accumulator::Avg { total, count } => JsonValue::from(*total / *count as f64),
        }
    }
}

/// Grouping key under which numerically equal ids (`1`, `1.0`) collide
fn group_key(id: &JsonValue) -> String {
    match id {
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        JsonValue::Array(items) => format!("[{}]", items.iter().map(group_key).collect::<Vec<_>>().join(",")),
        JsonValue::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(key, value)| format!("{:?}:{}", key, group_key(value)))
                .collect::<Vec<_>>()
                .join(",")
        ),
        other => other.to_string(),
    }
}

fn apply_group(input: &[JsonValue], spec: &JsonValue) -> BenchResult<Vec<JsonValue>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| unsupported(format!("$group needs an object, got {}", spec)))?;
    let id_expression = spec
        .get("_id")
        .ok_or_else(|| unsupported("$group needs an _id".to_string()))?;

    let mut outputs: Vec<(&String, &str, &JsonValue)> = Vec::new();
    for (alias, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (operator, operand) = match accumulator.as_object().and_then(|o| o.iter().next()) {
            Some((operator, operand)) if operator == "$sum" || operator == "$avg" => (operator.as_str(), operand),
            _ => return Err(unsupported(format!("Unsupported accumulator for {}: {}", alias, accumulator))),
        };
        outputs.push((alias, operator, operand));
    }

    let mut order: Vec<JsonValue> = Vec::new();
    let mut groups: HashMap<String, Vec<Accumulator>> = HashMap::new();
    for document in input {
        let id = evaluate(document, id_expression);
        let accumulators = groups.entry(group_key(&id)).or_insert_with(|| {
            order.push(id.clone());
            outputs
                .iter()
                .map(|(_, operator, _)| match *operator {
                    "$sum" => Accumulator::Sum { total: 0.0, integral: true },
                    _ => Accumulator::Avg { total: 0.0, count: 0 },
                })
                .collect()
        });
        for (accumulator, (_, _, operand)) in accumulators.iter_mut().zip(outputs.iter()) {
            accumulator.add(&evaluate(document, operand));
        }
    }

    Ok(order
        .into_iter()
        .map(|id| {
            let mut group = Map::new();
            if let Some(accumulators) = groups.get(&group_key(&id)) {
                for ((alias, _, _), accumulator) in outputs.iter().zip(accumulators) {
                    group.insert((*alias).clone(), accumulator.finish());
                }
            }
            group.insert("_id".to_string(), id);
            JsonValue::Object(group)
        })
        .collect())
}

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{self, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde_json::{json, Map, Value as JsonValue};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::engine::catalog::{Aggregate, Comparison, FieldPredicate, Pipeline, PipelineStage, QueryDescriptor, QuerySpec};
use crate::executors::executor_trait::{ensure_backend, BackendExecutor};
use crate::executors::local_store::LocalDocumentStore;
use crate::utils::{
    config::DocumentStoreConfig,
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, ColumnMetadata, DataType, FilterParams, ResultTable, Row, Value},
};

/// A store able to run aggregation pipelines written in MongoDB stage syntax
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `pipeline` against `collection` and return every output document
    async fn aggregate(&self, collection: &str, pipeline: &[JsonValue]) -> BenchResult<Vec<JsonValue>>;

    /// Add documents to `collection`, returning how many were written
    async fn insert(&self, collection: &str, documents: Vec<JsonValue>) -> BenchResult<usize>;

    fn describe(&self) -> String;
}

/// Render a pipeline with its parameter slots bound, one JSON object per stage
pub fn bind_pipeline(pipeline: &Pipeline, params: &FilterParams) -> BenchResult<Vec<JsonValue>> {
    pipeline
        .stages
        .iter()
        .map(|stage| match stage {
            PipelineStage::Match(predicates) => bind_match(predicates, params),
            PipelineStage::Unwind(path) => Ok(json!({ "$unwind": format!("${}", path) })),
            PipelineStage::Group { keys, aggregates } => {
                let id = match keys.as_slice() {
                    [single] => json!(format!("${}", single.field)),
                    _ => JsonValue::Object(
                        keys.iter()
                            .map(|k| (k.alias.clone(), json!(format!("${}", k.field))))
                            .collect(),
                    ),
                };

                let mut group = Map::new();
                group.insert("_id".to_string(), id);
                for aggregate in aggregates {
                    let accumulator = match aggregate {
                        Aggregate::Count { .. } => json!({ "$sum": 1 }),
                        Aggregate::Mean { field, .. } => json!({ "$avg": format!("${}", field) }),
                    };
                    group.insert(aggregate.alias().to_string(), accumulator);
                }
                Ok(json!({ "$group": group }))
            }
        })
        .collect()
}

fn bind_match(predicates: &[FieldPredicate], params: &FilterParams) -> BenchResult<JsonValue> {
    let mut conditions = Map::new();
    for predicate in predicates {
        let operator = match predicate.comparison {
            Comparison::Gte => "$gte",
            Comparison::Lte => "$lte",
            Comparison::In => "$in",
        };
        let value = params.bind(predicate.slot)?.to_json();

        let condition = conditions
            .entry(predicate.field.clone())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if let JsonValue::Object(ops) = condition {
            ops.insert(operator.to_string(), value);
        }
    }
    Ok(json!({ "$match": conditions }))
}

/// Turn output documents into a table; columns appear in first-seen order
pub fn documents_to_table(documents: Vec<JsonValue>) -> BenchResult<ResultTable> {
    let mut names: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(documents.len());
    for document in documents {
        let JsonValue::Object(object) = document else {
            return Err(ConnectorError::QueryFailed(format!("Expected a document, got {}", document)).into());
        };
        for key in object.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
        objects.push(object);
    }

    let rows: Vec<Row> = objects
        .iter()
        .map(|object| {
            Row::new(
                names
                    .iter()
                    .map(|name| object.get(name).map(Value::from_json).unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect();

    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let data_type = rows
                .iter()
                .filter_map(|r| r.get(i))
                .find(|v| **v != Value::Null)
                .map(Value::data_type)
                .unwrap_or(DataType::Text);
            ColumnMetadata::new(name, data_type)
        })
        .collect();

    Ok(ResultTable::new(columns, rows))
}

fn map_mongo_error(action: &'static str) -> impl Fn(MongoError) -> BenchError {
    move |e| match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
            ConnectorError::BackendUnavailable(format!("MongoDB unreachable: {}", e)).into()
        }
        _ => ConnectorError::QueryFailed(format!("MongoDB {} failed: {}", action, e)).into(),
    }
}

/// MongoDB through the official driver; the client is created on first use
pub struct MongoStore {
    uri: String,
    database: String,
    client: OnceCell<Client>,
}

impl MongoStore {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> BenchResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut options = ClientOptions::parse(&self.uri).await.map_err(|e| {
                    BenchError::Configuration(format!("Invalid MongoDB uri {}: {}", self.uri, e))
                })?;
                if options.server_selection_timeout.is_none() {
                    options.server_selection_timeout = Some(Duration::from_secs(5));
                }
                let client = Client::with_options(options).map_err(map_mongo_error("connection"))?;
                info!(database = %self.database, "MongoDB client created");
                Ok::<_, BenchError>(client)
            })
            .await
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn aggregate(&self, collection: &str, pipeline: &[JsonValue]) -> BenchResult<Vec<JsonValue>> {
        let stages = pipeline
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<Document>, _>>()
            .map_err(|e| ConnectorError::QueryFailed(format!("Cannot encode pipeline stage: {}", e)))?;

        let client = self.client().await?;
        let cursor = client
            .database(&self.database)
            .collection::<Document>(collection)
            .aggregate(stages, None)
            .await
            .map_err(map_mongo_error("aggregation"))?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(map_mongo_error("aggregation"))?;

        Ok(documents
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect())
    }

    async fn insert(&self, collection: &str, documents: Vec<JsonValue>) -> BenchResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let documents = documents
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<Document>, _>>()
            .map_err(|e| ConnectorError::QueryFailed(format!("Cannot encode document: {}", e)))?;

        let client = self.client().await?;
        let result = client
            .database(&self.database)
            .collection::<Document>(collection)
            .insert_many(documents, None)
            .await
            .map_err(map_mongo_error("insert"))?;
        Ok(result.inserted_ids.len())
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.uri, self.database)
    }
}

/// The store a configuration names; nothing connects until first use
pub fn open_store(config: &DocumentStoreConfig) -> Box<dyn DocumentStore> {
    match config {
        DocumentStoreConfig::Mongo { uri, database } => Box::new(MongoStore::new(uri, database)),
        DocumentStoreConfig::Local { collections } => Box::new(LocalDocumentStore::from_files(collections)),
    }
}

/// Document executor: binds pipelines and hands them to a document store
pub struct DocumentExecutor {
    store: Box<dyn DocumentStore>,
}

impl DocumentExecutor {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn from_config(config: &DocumentStoreConfig) -> Self {
        Self::new(open_store(config))
    }
}

#[async_trait]
impl BackendExecutor for DocumentExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor, params: &FilterParams) -> BenchResult<ResultTable> {
        ensure_backend(Backend::Document, descriptor)?;
        let QuerySpec::Pipeline(pipeline) = &descriptor.query else {
            return Err(ConnectorError::QueryFailed("Document executor needs a pipeline".to_string()).into());
        };

        let stages = bind_pipeline(pipeline, params)?;
        debug!(collection = %pipeline.collection, stages = stages.len(), "running aggregation pipeline");

        let documents = self.store.aggregate(&pipeline.collection, &stages).await?;
        documents_to_table(documents)
    }

    fn backend(&self) -> Backend {
        Backend::Document
    }

    fn describe(&self) -> String {
        format!("MongoDB ({})", self.store.describe())
    }
}

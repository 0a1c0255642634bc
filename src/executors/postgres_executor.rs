use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row as PgRow};
use tracing::debug;

use crate::engine::catalog::{QueryDescriptor, QuerySpec, SqlStatement};
use crate::executors::executor_trait::{ensure_backend, BackendExecutor};
use crate::utils::{
    config::PostgresConfig,
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, ColumnMetadata, DataType, FilterParams, ParamValue, ResultTable, Row, Value},
};

/// Build a connection pool. Connections are opened lazily on first checkout.
pub fn create_pool(config: &PostgresConfig) -> BenchResult<Pool> {
    let mut pg_config = Config::new();
    pg_config.host = Some(config.host.clone());
    pg_config.port = Some(config.port);
    pg_config.user = Some(config.user.clone());
    pg_config.password = Some(config.password.clone());
    pg_config.dbname = Some(config.dbname.clone());
    pg_config.connect_timeout = Some(Duration::from_secs(config.connect_timeout));
    pg_config.pool = Some(PoolConfig::new(config.max_connections as usize));

    pg_config
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| BenchError::Configuration(format!("Failed to create PostgreSQL pool: {}", e)))
}

/// Bind the statement's slots, in order, to owned SQL parameters
pub fn bind_params(statement: &SqlStatement, params: &FilterParams) -> BenchResult<Vec<Box<dyn ToSql + Sync + Send>>> {
    statement
        .params
        .iter()
        .map(|slot| -> BenchResult<Box<dyn ToSql + Sync + Send>> {
            let bound: Box<dyn ToSql + Sync + Send> = match params.bind(*slot)? {
                ParamValue::Integer(i) => Box::new(i),
                ParamValue::Float(f) => Box::new(f),
                ParamValue::IntegerList(list) => Box::new(list),
                ParamValue::TextList(list) => Box::new(list),
            };
            Ok(bound)
        })
        .collect()
}

/// PostgreSQL executor backed by a deadpool connection pool
pub struct PostgresExecutor {
    pool: Pool,
    target: String,
}

impl PostgresExecutor {
    pub fn new(config: &PostgresConfig) -> BenchResult<Self> {
        Ok(Self {
            pool: create_pool(config)?,
            target: format!("{}@{}:{}/{}", config.user, config.host, config.port, config.dbname),
        })
    }

    /// Convert PostgreSQL row to internal Row representation
    fn convert_pg_row(pg_row: &PgRow) -> BenchResult<Row> {
        let values = (0..pg_row.len())
            .map(|i| Self::convert_pg_value(pg_row, i))
            .collect::<BenchResult<Vec<_>>>()?;
        Ok(Row::new(values))
    }

    /// Convert one cell based on its type OID
    fn convert_pg_value(row: &PgRow, index: usize) -> BenchResult<Value> {
        let type_oid = row.columns()[index].type_().oid();
        let failed = |e: tokio_postgres::Error| {
            BenchError::from(ConnectorError::QueryFailed(format!(
                "Failed to read column '{}': {}",
                row.columns()[index].name(),
                e
            )))
        };

        let value = match type_oid {
            25 | 1043 | 1042 => row.try_get::<_, Option<String>>(index).map_err(failed)?.map(Value::Text),
            23 => row
                .try_get::<_, Option<i32>>(index)
                .map_err(failed)?
                .map(|v| Value::Integer(v as i64)),
            20 => row.try_get::<_, Option<i64>>(index).map_err(failed)?.map(Value::Integer),
            21 => row
                .try_get::<_, Option<i16>>(index)
                .map_err(failed)?
                .map(|v| Value::Integer(v as i64)),
            700 => row
                .try_get::<_, Option<f32>>(index)
                .map_err(failed)?
                .map(|v| Value::Float(v as f64)),
            701 => row.try_get::<_, Option<f64>>(index).map_err(failed)?.map(Value::Float),
            16 => row.try_get::<_, Option<bool>>(index).map_err(failed)?.map(Value::Boolean),
            114 | 3802 => row
                .try_get::<_, Option<serde_json::Value>>(index)
                .map_err(failed)?
                .map(|v| Value::Json(v.to_string())),
            _ => row.try_get::<_, Option<String>>(index).map_err(failed)?.map(Value::Text),
        };

        Ok(value.unwrap_or(Value::Null))
    }

    fn pg_type_to_data_type(type_oid: u32) -> DataType {
        match type_oid {
            23 | 20 | 21 => DataType::Integer,
            700 | 701 => DataType::Float,
            16 => DataType::Boolean,
            114 | 3802 => DataType::Json,
            _ => DataType::Text,
        }
    }
}

#[async_trait]
impl BackendExecutor for PostgresExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor, params: &FilterParams) -> BenchResult<ResultTable> {
        ensure_backend(Backend::Relational, descriptor)?;
        let QuerySpec::Sql(statement) = &descriptor.query else {
            return Err(ConnectorError::QueryFailed("Relational executor needs a SQL statement".to_string()).into());
        };

        let owned = bind_params(statement, params)?;
        let bound: Vec<&(dyn ToSql + Sync)> = owned.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await.map_err(|e| {
            ConnectorError::BackendUnavailable(format!("Failed to get connection from pool: {}", e))
        })?;

        let prepared = client
            .prepare(&statement.text)
            .await
            .map_err(|e| ConnectorError::QueryFailed(format!("Failed to prepare statement: {}", e)))?;
        let columns: Vec<ColumnMetadata> = prepared
            .columns()
            .iter()
            .map(|c| ColumnMetadata::new(c.name(), Self::pg_type_to_data_type(c.type_().oid())))
            .collect();

        let pg_rows = client
            .query(&prepared, &bound)
            .await
            .map_err(|e| ConnectorError::QueryFailed(format!("Query execution failed: {}", e)))?;
        debug!(rows = pg_rows.len(), "relational query returned");

        let rows = pg_rows
            .iter()
            .map(Self::convert_pg_row)
            .collect::<BenchResult<Vec<_>>>()?;

        Ok(ResultTable::new(columns, rows))
    }

    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn describe(&self) -> String {
        format!("PostgreSQL ({})", self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::catalog::QueryCatalog;
    use crate::utils::types::{Complexity, Dataset, EcommerceFilters};

    #[test]
    fn test_bind_params_follows_slot_order() {
        let catalog = QueryCatalog::standard().unwrap();
        let descriptor = catalog
            .resolve(Dataset::Ecommerce, Backend::Relational, Complexity::Complex)
            .unwrap();
        let QuerySpec::Sql(statement) = &descriptor.query else { panic!("expected sql") };

        let params = FilterParams::Ecommerce(EcommerceFilters::default());
        let bound = bind_params(statement, &params).unwrap();
        assert_eq!(bound.len(), 3);
    }

    #[test]
    fn test_bind_params_rejects_wrong_dataset() {
        let catalog = QueryCatalog::standard().unwrap();
        let descriptor = catalog.resolve(Dataset::Census, Backend::Relational, Complexity::Simple).unwrap();
        let QuerySpec::Sql(statement) = &descriptor.query else { panic!("expected sql") };

        let params = FilterParams::default_for(Dataset::Ecommerce);
        assert!(bind_params(statement, &params).is_err());
    }

    #[test]
    fn test_pg_type_mapping() {
        assert_eq!(PostgresExecutor::pg_type_to_data_type(20), DataType::Integer);
        assert_eq!(PostgresExecutor::pg_type_to_data_type(701), DataType::Float);
        assert_eq!(PostgresExecutor::pg_type_to_data_type(1043), DataType::Text);
        assert_eq!(PostgresExecutor::pg_type_to_data_type(3802), DataType::Json);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        let config = PostgresConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: 1,
            ..PostgresConfig::default()
        };
        let executor = PostgresExecutor::new(&config).unwrap();
        assert_eq!(executor.describe(), "PostgreSQL (user@127.0.0.1:1/demo_db)");

        let catalog = QueryCatalog::standard().unwrap();
        let descriptor = catalog.resolve(Dataset::Census, Backend::Relational, Complexity::Simple).unwrap();
        let err = executor
            .execute(descriptor, &FilterParams::default_for(Dataset::Census))
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
    }
}

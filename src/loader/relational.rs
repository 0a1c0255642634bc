use deadpool_postgres::{Object, Pool};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tokio_postgres::types::ToSql;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executors::postgres_executor::create_pool;
use crate::generator::Product;
use crate::loader::{read_products, CensusTable, LoadReport, CENSUS_TABLE};
use crate::utils::{
    config::{FlatFileConfig, PostgresConfig},
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, Dataset},
};

/// Bind parameters per statement, under PostgreSQL's limit of 65535
const MAX_PARAMS: usize = 60_000;
const MAX_ROWS_PER_BATCH: usize = 1_000;

const CREATE_PRODUCT_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS products (
        product_id UUID PRIMARY KEY,
        name TEXT,
        price DOUBLE PRECISION,
        category TEXT,
        color TEXT,
        size TEXT,
        weight DOUBLE PRECISION
    );
    CREATE TABLE IF NOT EXISTS reviews (
        review_id SERIAL PRIMARY KEY,
        product_id UUID REFERENCES products(product_id),
        user_name TEXT,
        rating INTEGER,
        comment TEXT
    );";

const PRODUCT_COLUMNS: [&str; 7] = ["product_id", "name", "price", "category", "color", "size", "weight"];
const REVIEW_COLUMNS: [&str; 4] = ["product_id", "user_name", "rating", "comment"];

type OwnedParam = Box<dyn ToSql + Sync + Send>;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` for a census extract; every column is a bigint
pub fn create_census_table_sql(columns: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| format!("{} BIGINT", quote_ident(c))).collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", CENSUS_TABLE, columns.join(", "))
}

/// Multi-row `INSERT` with numbered placeholders
pub fn insert_sql<S: AsRef<str>>(table: &str, columns: &[S], rows: usize) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c.as_ref())).collect();
    let width = columns.len();
    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let slots: Vec<String> = (1..=width).map(|col| format!("${}", row * width + col)).collect();
            format!("({})", slots.join(", "))
        })
        .collect();
    format!("INSERT INTO {} ({}) VALUES {}", table, names.join(", "), tuples.join(", "))
}

/// Rows per statement for a table `width` columns wide
pub fn rows_per_batch(width: usize) -> usize {
    (MAX_PARAMS / width.max(1)).clamp(1, MAX_ROWS_PER_BATCH)
}

fn product_params(product: &Product) -> Vec<OwnedParam> {
    vec![
        Box::new(product.product_id),
        Box::new(product.name.clone()),
        Box::new(product.price),
        Box::new(product.category.clone()),
        Box::new(product.attributes.color.clone()),
        Box::new(product.attributes.size.clone()),
        Box::new(product.attributes.weight),
    ]
}

fn review_params(product: &Product) -> Vec<Vec<OwnedParam>> {
    product
        .reviews
        .iter()
        .map(|review| -> Vec<OwnedParam> {
            vec![
                Box::new(product.product_id),
                Box::new(review.user.clone()),
                Box::new(review.rating as i32),
                Box::new(review.comment.clone()),
            ]
        })
        .collect()
}

fn as_refs(params: &[OwnedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
}

fn write_failed(e: tokio_postgres::Error) -> BenchError {
    ConnectorError::QueryFailed(format!("Load failed: {}", e)).into()
}

/// Creates the benchmark tables and bulk-inserts into them through the pool.
/// Each load runs in one transaction.
pub struct RelationalLoader {
    pool: Pool,
    target: String,
}

impl RelationalLoader {
    pub fn new(config: &PostgresConfig) -> BenchResult<Self> {
        Ok(Self {
            pool: create_pool(config)?,
            target: format!("PostgreSQL ({}@{}:{}/{})", config.user, config.host, config.port, config.dbname),
        })
    }

    async fn client(&self) -> BenchResult<Object> {
        self.pool.get().await.map_err(|e| {
            ConnectorError::BackendUnavailable(format!("Failed to get connection from pool: {}", e)).into()
        })
    }

    /// Read `input` and load it, timing the whole operation
    pub async fn load(&self, dataset: Dataset, input: &Path, flat_file: &FlatFileConfig) -> BenchResult<LoadReport> {
        let start = Instant::now();
        let (records, related, table) = match dataset {
            Dataset::Census => {
                let table = CensusTable::read(input, flat_file)?;
                (self.load_census(&table).await?, 0, CENSUS_TABLE)
            }
            Dataset::Ecommerce => {
                let products = read_products(input)?;
                let (products, reviews) = self.load_products(&products).await?;
                (products, reviews, "products")
            }
        };

        let report = LoadReport {
            dataset,
            backend: Backend::Relational,
            target: format!("{} ({})", self.target, table),
            records,
            related,
            duration: start.elapsed(),
        };
        info!(%dataset, records, related, seconds = report.duration.as_secs_f64(), "relational load finished");
        Ok(report)
    }

    async fn in_transaction<'a, F, Fut, T>(&self, client: &'a Object, body: F) -> BenchResult<T>
    where
        F: FnOnce(&'a Object) -> Fut,
        Fut: std::future::Future<Output = BenchResult<T>>,
    {
        client.batch_execute("BEGIN").await.map_err(write_failed)?;
        match body(client).await {
            Ok(value) => {
                client.batch_execute("COMMIT").await.map_err(write_failed)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = client.batch_execute("ROLLBACK").await {
                    warn!(error = %rollback, "rollback after failed load");
                }
                Err(e)
            }
        }
    }

    /// Create `census_data` with the file's columns and insert every row
    pub async fn load_census(&self, table: &CensusTable) -> BenchResult<usize> {
        if table.columns.is_empty() {
            return Err(BenchError::Configuration("Census input has no columns to load".to_string()));
        }
        let client = self.client().await?;

        self.in_transaction(&client, |client| async move {
            client
                .batch_execute(&create_census_table_sql(&table.columns))
                .await
                .map_err(write_failed)?;

            let mut written = 0;
            for chunk in table.rows.chunks(rows_per_batch(table.columns.len())) {
                let sql = insert_sql(CENSUS_TABLE, &table.columns, chunk.len());
                let params: Vec<&(dyn ToSql + Sync)> = chunk
                    .iter()
                    .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                    .collect();
                written += client.execute(sql.as_str(), &params).await.map_err(write_failed)? as usize;
                debug!(written, "census batch inserted");
            }
            Ok(written)
        })
        .await
    }

    /// Create `products` and `reviews`, insert the products, then the reviews
    /// of the products that were new. Returns (products, reviews) written.
    pub async fn load_products(&self, products: &[Product]) -> BenchResult<(usize, usize)> {
        let client = self.client().await?;

        self.in_transaction(&client, |client| async move {
            client.batch_execute(CREATE_PRODUCT_TABLES).await.map_err(write_failed)?;

            let mut inserted: HashSet<Uuid> = HashSet::new();
            for chunk in products.chunks(rows_per_batch(PRODUCT_COLUMNS.len())) {
                let sql = format!(
                    "{} ON CONFLICT (product_id) DO NOTHING RETURNING product_id",
                    insert_sql("products", &PRODUCT_COLUMNS, chunk.len())
                );
                let owned: Vec<OwnedParam> = chunk.iter().flat_map(product_params).collect();
                let rows = client.query(sql.as_str(), &as_refs(&owned)).await.map_err(write_failed)?;
                for row in rows {
                    inserted.insert(row.try_get(0).map_err(write_failed)?);
                }
            }

            let reviews: Vec<Vec<OwnedParam>> = products
                .iter()
                .filter(|p| inserted.contains(&p.product_id))
                .flat_map(review_params)
                .collect();
            let mut review_count = 0;
            for chunk in reviews.chunks(rows_per_batch(REVIEW_COLUMNS.len())) {
                let sql = insert_sql("reviews", &REVIEW_COLUMNS, chunk.len());
                let params: Vec<&(dyn ToSql + Sync)> = chunk.iter().flat_map(|row| as_refs(row)).collect();
                review_count += client.execute(sql.as_str(), &params).await.map_err(write_failed)? as usize;
            }

            Ok((inserted.len(), review_count))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::EcommerceGenerator;

    #[test]
    fn test_insert_sql_numbers_placeholders_row_major() {
        let sql = insert_sql("reviews", &["product_id", "rating"], 3);
        assert_eq!(
            sql,
            "INSERT INTO reviews (\"product_id\", \"rating\") VALUES ($1, $2), ($3, $4), ($5, $6)"
        );
    }

    #[test]
    fn test_census_table_quotes_mixed_case_columns() {
        let sql = create_census_table_sql(&["dAge".to_string(), "iSex".to_string()]);
        assert_eq!(sql, "CREATE TABLE IF NOT EXISTS census_data (\"dAge\" BIGINT, \"iSex\" BIGINT)");
    }

    #[test]
    fn test_rows_per_batch_respects_parameter_limit() {
        assert_eq!(rows_per_batch(7), MAX_ROWS_PER_BATCH);
        assert_eq!(rows_per_batch(120), 500);
        assert_eq!(rows_per_batch(100_000), 1);
        assert!(rows_per_batch(68) * 68 <= MAX_PARAMS);
    }

    #[test]
    fn test_params_match_column_lists() {
        let product = EcommerceGenerator::new(8)
            .products(20)
            .into_iter()
            .find(|p| !p.reviews.is_empty())
            .unwrap();

        assert_eq!(product_params(&product).len(), PRODUCT_COLUMNS.len());
        let reviews = review_params(&product);
        assert_eq!(reviews.len(), product.reviews.len());
        assert!(reviews.iter().all(|r| r.len() == REVIEW_COLUMNS.len()));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        let config = PostgresConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: 1,
            ..PostgresConfig::default()
        };
        let loader = RelationalLoader::new(&config).unwrap();

        let err = loader.load_products(&EcommerceGenerator::new(1).products(2)).await.unwrap_err();
        assert!(err.is_backend_unavailable());
    }
}

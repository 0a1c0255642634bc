use dbbench::engine::{catalog::tier_shape, presenter::normalize, QueryCatalog};
use dbbench::executors::{BackendExecutor, DocumentExecutor, FlatFileExecutor, LocalDocumentStore};
use dbbench::generator::{write_csv, write_json_lines, CensusGenerator, EcommerceGenerator, Product};
use dbbench::utils::{
    config::{DocumentStoreConfig, FlatFileConfig},
    types::{
        Backend, CensusFilters, Complexity, Dataset, EcommerceFilters, FilterParams, ResultTable,
        ECOMMERCE_CATEGORIES,
    },
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn all_categories(price_min: f64, price_max: f64) -> FilterParams {
    FilterParams::Ecommerce(EcommerceFilters {
        price_min,
        price_max,
        categories: ECOMMERCE_CATEGORIES.iter().map(|c| c.to_string()).collect(),
    })
}

fn products() -> Vec<Product> {
    EcommerceGenerator::new(99).products(150)
}

fn executor_over(products: &[Product]) -> DocumentExecutor {
    let documents = products.iter().map(|p| serde_json::to_value(p).unwrap()).collect();
    DocumentExecutor::new(Box::new(LocalDocumentStore::new().with_documents("products", documents)))
}

async fn run(executor: &DocumentExecutor, complexity: Complexity, params: &FilterParams) -> ResultTable {
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Ecommerce, Backend::Document, complexity).unwrap();
    let raw = executor.execute(descriptor, params).await.unwrap();
    normalize(Dataset::Ecommerce, complexity, &raw).unwrap()
}

#[tokio::test]
async fn test_average_price_per_category_in_range() {
    let products = products();
    let executor = executor_over(&products);

    let table = run(&executor, Complexity::Simple, &all_categories(0.0, 1000.0)).await;

    let categories: BTreeSet<String> = table
        .column_values("category")
        .unwrap()
        .iter()
        .map(|v| v.to_string())
        .collect();
    let expected: BTreeSet<String> = products.iter().map(|p| p.category.clone()).collect();
    assert_eq!(categories, expected);

    for price in table.column_values("average_price").unwrap() {
        let price = price.as_f64().unwrap();
        assert!((10.0..=1000.0).contains(&price), "average price {} out of range", price);
    }
}

#[tokio::test]
async fn test_average_rating_stays_within_review_scale() {
    let executor = executor_over(&products());

    let table = run(&executor, Complexity::Moderate, &all_categories(0.0, 1000.0)).await;

    assert!(!table.is_empty());
    for rating in table.column_values("average_rating").unwrap() {
        let rating = rating.as_f64().unwrap();
        assert!((1.0..=5.0).contains(&rating), "average rating {} out of range", rating);
    }
}

#[tokio::test]
async fn test_complex_groups_by_category_and_color() {
    let products = products();
    let executor = executor_over(&products);
    let params = FilterParams::Ecommerce(EcommerceFilters {
        price_min: 100.0,
        price_max: 600.0,
        categories: vec!["Books".to_string()],
    });

    let table = run(&executor, Complexity::Complex, &params).await;

    let expected: BTreeSet<(String, String)> = products
        .iter()
        .filter(|p| p.category == "Books" && (100.0..=600.0).contains(&p.price) && !p.reviews.is_empty())
        .map(|p| (p.category.clone(), p.attributes.color.clone()))
        .collect();
    let actual: BTreeSet<(String, String)> = table
        .rows
        .iter()
        .map(|row| (row.values[0].to_string(), row.values[1].to_string()))
        .collect();
    assert_eq!(actual, expected);

    for price in table.column_values("average_price").unwrap() {
        assert!((100.0..=600.0).contains(&price.as_f64().unwrap()));
    }
}

#[tokio::test]
async fn test_complex_over_all_categories_stays_in_range() {
    let executor = executor_over(&products());

    let table = run(&executor, Complexity::Complex, &all_categories(0.0, 1000.0)).await;

    assert!(!table.is_empty());
    let categories: BTreeSet<String> = table
        .column_values("category")
        .unwrap()
        .iter()
        .map(|v| v.to_string())
        .collect();
    assert!(categories.iter().all(|c| ECOMMERCE_CATEGORIES.contains(&c.as_str())));

    for rating in table.column_values("average_rating").unwrap() {
        let rating = rating.as_f64().unwrap();
        assert!((1.0..=5.0).contains(&rating), "average rating {} out of range", rating);
    }
    for price in table.column_values("average_price").unwrap() {
        let price = price.as_f64().unwrap();
        assert!((10.0..=1000.0).contains(&price), "average price {} out of range", price);
    }
}

#[tokio::test]
async fn test_price_window_with_no_products_is_empty() {
    let executor = executor_over(&products());

    let table = run(&executor, Complexity::Simple, &all_categories(2000.0, 3000.0)).await;

    assert!(table.is_empty());
    assert_eq!(table.columns.len(), 2);
}

#[tokio::test]
async fn test_local_collection_read_from_json_lines() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("products.jsonl");
    let products = products();
    write_json_lines(&path, &products).unwrap();

    let mut collections = HashMap::new();
    collections.insert("products".to_string(), path);
    let from_file = DocumentExecutor::from_config(&DocumentStoreConfig::Local { collections });
    let in_memory = executor_over(&products);

    let params = all_categories(0.0, 1000.0);
    assert_eq!(
        run(&from_file, Complexity::Moderate, &params).await,
        run(&in_memory, Complexity::Moderate, &params).await
    );
}

/// Rows keyed by their group columns, measures alongside
fn keyed_rows(table: &ResultTable, key_count: usize) -> BTreeMap<Vec<i64>, Vec<f64>> {
    table
        .rows
        .iter()
        .map(|row| {
            let keys = row.values[..key_count].iter().map(|v| v.as_i64().unwrap()).collect();
            let measures = row.values[key_count..].iter().map(|v| v.as_f64().unwrap()).collect();
            (keys, measures)
        })
        .collect()
}

#[tokio::test]
async fn test_census_pipelines_agree_with_flat_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("census.csv");
    let records = CensusGenerator::new(23).records(600);
    write_csv(&path, &records).unwrap();

    let flat_file = FlatFileExecutor::new(&FlatFileConfig::default())
        .unwrap()
        .with_source("census_data", &path);
    let documents = records.iter().map(|r| serde_json::to_value(r).unwrap()).collect();
    let document = DocumentExecutor::new(Box::new(LocalDocumentStore::new().with_documents("census_data", documents)));

    let filters = CensusFilters {
        age_min: 2,
        age_max: 5,
        income_threshold: 1,
        sex_options: vec![0, 1],
    };
    let expected_rows = records
        .iter()
        .filter(|r| (2..=5).contains(&r.age) && r.income >= 1)
        .count() as i64;
    let params = FilterParams::Census(filters);
    let catalog = QueryCatalog::standard().unwrap();

    for complexity in Complexity::ALL {
        let from_documents = {
            let descriptor = catalog.resolve(Dataset::Census, Backend::Document, complexity).unwrap();
            normalize(Dataset::Census, complexity, &document.execute(descriptor, &params).await.unwrap()).unwrap()
        };
        let from_file = {
            let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, complexity).unwrap();
            normalize(Dataset::Census, complexity, &flat_file.execute(descriptor, &params).await.unwrap()).unwrap()
        };

        let key_count = tier_shape(Dataset::Census, complexity).keys.len();
        let documents = keyed_rows(&from_documents, key_count);
        let file = keyed_rows(&from_file, key_count);
        assert!(!documents.is_empty());
        assert_eq!(documents.keys().collect::<Vec<_>>(), file.keys().collect::<Vec<_>>(), "{} groups", complexity);
        for (group, measures) in &documents {
            for (a, b) in measures.iter().zip(&file[group]) {
                assert!((a - b).abs() < 1e-9, "{} group {:?}: {} vs {}", complexity, group, a, b);
            }
        }

        if complexity == Complexity::Simple {
            let sexes: BTreeSet<i64> = documents.keys().map(|k| k[0]).collect();
            assert!(sexes.is_subset(&BTreeSet::from([0, 1])));
            let total: i64 = from_documents
                .column_values("count")
                .unwrap()
                .iter()
                .filter_map(|v| v.as_i64())
                .sum();
            assert_eq!(total, expected_rows);
        }
    }
}

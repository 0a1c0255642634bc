use dbbench::engine::{presenter::normalize, QueryCatalog};
use dbbench::executors::{BackendExecutor, FlatFileExecutor};
use dbbench::generator::{write_csv, CensusGenerator, CensusRecord};
use dbbench::utils::{
    config::FlatFileConfig,
    types::{Backend, CensusFilters, Complexity, Dataset, FilterParams, Value},
};
use std::collections::BTreeSet;
use tempfile::TempDir;

/// Write a generated census extract and return the directory, the records and an executor over them
fn census_fixture(count: usize) -> (TempDir, Vec<CensusRecord>, FlatFileExecutor) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("census.csv");
    let records = CensusGenerator::new(11).records(count);
    write_csv(&path, &records).expect("Failed to write census CSV");

    let executor = FlatFileExecutor::new(&FlatFileConfig::default())
        .expect("Failed to build executor")
        .with_source("census_data", &path);
    (temp_dir, records, executor)
}

fn filters(age_min: i64, age_max: i64, income_threshold: i64, sex_options: Vec<i64>) -> FilterParams {
    FilterParams::Census(CensusFilters {
        age_min,
        age_max,
        income_threshold,
        sex_options,
    })
}

fn matches(record: &CensusRecord, params: &FilterParams) -> bool {
    let FilterParams::Census(f) = params else {
        return false;
    };
    record.age >= f.age_min
        && record.age <= f.age_max
        && record.income >= f.income_threshold
        && f.sex_options.contains(&record.sex)
}

#[tokio::test]
async fn test_simple_counts_cover_filtered_rows() {
    let (_dir, records, executor) = census_fixture(400);
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, Complexity::Simple).unwrap();
    let params = filters(2, 5, 1, vec![0, 1]);

    let table = executor.execute(descriptor, &params).await.unwrap();

    let keys: BTreeSet<i64> = table
        .column_values("iSex")
        .unwrap()
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    assert!(keys.is_subset(&BTreeSet::from([0, 1])));

    let total: i64 = table.column_values("count").unwrap().iter().filter_map(|v| v.as_i64()).sum();
    let expected = records.iter().filter(|r| matches(r, &params)).count() as i64;
    assert_eq!(total, expected);
    assert!(expected > 0);
}

#[tokio::test]
async fn test_sex_filter_restricts_groups() {
    let (_dir, _records, executor) = census_fixture(200);
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, Complexity::Moderate).unwrap();

    let table = executor.execute(descriptor, &filters(0, 7, 0, vec![1])).await.unwrap();

    assert_eq!(table.row_count(), 1);
    assert_eq!(table.rows[0].values[0], Value::Integer(1));
    let avg = table.rows[0].values[1].as_f64().unwrap();
    assert!((0.0..=4.0).contains(&avg));
}

#[tokio::test]
async fn test_repeated_execution_is_identical() {
    let (_dir, _records, executor) = census_fixture(300);
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, Complexity::Complex).unwrap();
    let params = filters(0, 7, 2, vec![0, 1]);

    assert!(!executor.is_loaded("census_data"));
    let first = executor.execute(descriptor, &params).await.unwrap();
    assert!(executor.is_loaded("census_data"));
    let second = executor.execute(descriptor, &params).await.unwrap();

    assert_eq!(first, second);
    let normalized = normalize(Dataset::Census, Complexity::Complex, &first).unwrap();
    let names: Vec<&str> = normalized.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["iSex", "iMarital", "mean", "count"]);
}

#[tokio::test]
async fn test_filters_excluding_everything_give_empty_table() {
    let (_dir, _records, executor) = census_fixture(50);
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, Complexity::Simple).unwrap();

    let table = executor.execute(descriptor, &filters(20, 60, 30_000, vec![0, 1])).await.unwrap();
    assert!(table.is_empty());
    assert_eq!(table.columns.len(), 2);
}

#[tokio::test]
async fn test_missing_file_is_backend_unavailable() {
    let executor = FlatFileExecutor::new(&FlatFileConfig::default())
        .unwrap()
        .with_source("census_data", "/nonexistent/census.csv");
    let catalog = QueryCatalog::standard().unwrap();
    let descriptor = catalog.resolve(Dataset::Census, Backend::FlatFile, Complexity::Simple).unwrap();

    let err = executor
        .execute(descriptor, &FilterParams::default_for(Dataset::Census))
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());
}

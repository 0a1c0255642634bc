use std::path::Path;
use std::process::Command;

/// Run the dbbench binary and capture its output
fn run_cli_command(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_dbbench"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn assert_output_contains(output: &str, expected: &str) {
    assert!(
        output.contains(expected),
        "Output did not contain expected text.\nExpected: {}\nActual output:\n{}",
        expected,
        output
    );
}

/// Config pointing the flat-file backend and the query log into `dir`
fn write_config(dir: &Path) -> String {
    let config = serde_json::json!({
        "flat_file": { "sources": { "census_data": dir.join("census.csv") } },
        "document": { "kind": "local", "collections": { "products": dir.join("products.json") } },
        "query_log": { "kind": "sqlite", "path": dir.join("query_logs.db") }
    });
    let path = dir.join("dbbench.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_cli_help_command() {
    let (stdout, _stderr, exit_code) = run_cli_command(&["--help"]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Commands:");
    for command in ["run", "populate", "report", "catalog", "generate", "load"] {
        assert_output_contains(&stdout, command);
    }
}

#[test]
fn test_cli_catalog_command() {
    let (stdout, _stderr, exit_code) = run_cli_command(&["catalog"]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Query Catalog:");
    assert_output_contains(&stdout, "Census Data / PostgreSQL / Simple");
    assert_output_contains(&stdout, "no flat file exists for the e-commerce dataset");
}

#[test]
fn test_cli_generate_run_and_report() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();
    let config = write_config(dir);
    let census = dir.join("census.csv").to_string_lossy().to_string();
    let products = dir.join("products.json").to_string_lossy().to_string();

    let (stdout, _, exit_code) = run_cli_command(&["generate", "-d", "census", "-n", "200", "-o", &census]);
    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Wrote 200 Census Data records");

    let (_, _, exit_code) = run_cli_command(&["generate", "-d", "ecommerce", "-n", "50", "-o", &products]);
    assert_eq!(exit_code, 0);

    let (stdout, stderr, exit_code) = run_cli_command(&[
        "--config", &config, "run", "-d", "census", "-b", "flat-file", "-q", "simple", "--age-max", "7", "-f", "csv",
    ]);
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert_output_contains(&stdout, "iSex,count");

    let (stdout, stderr, exit_code) = run_cli_command(&[
        "--config", &config, "run", "-d", "ecommerce", "-b", "document", "-q", "moderate", "--category",
        "Books,Toys", "--chart",
    ]);
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert_output_contains(&stdout, "Query executed in");
    assert_output_contains(&stdout, "Average Rating");

    let (stdout, _, exit_code) = run_cli_command(&["--config", &config, "report", "-f", "csv"]);
    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Census Data,Flat File,Simple,1,");
    assert_output_contains(&stdout, "E-commerce Data,MongoDB,Moderate,1,");
}

#[test]
fn test_cli_load_then_query_local_documents() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();
    let config = write_config(dir);
    let generated = dir.join("generated.jsonl").to_string_lossy().to_string();

    let (_, _, exit_code) =
        run_cli_command(&["generate", "-d", "ecommerce", "-n", "40", "-f", "jsonl", "-o", &generated]);
    assert_eq!(exit_code, 0);

    let (stdout, stderr, exit_code) =
        run_cli_command(&["--config", &config, "load", "-d", "ecommerce", "-b", "document", "-i", &generated]);
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert_output_contains(&stdout, "Loaded 40 E-commerce Data records");

    let (stdout, stderr, exit_code) = run_cli_command(&[
        "--config", &config, "run", "-d", "ecommerce", "-b", "document", "-q", "simple", "-f", "json",
    ]);
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(parsed["metadata"]["duration_seconds"].as_f64().is_some());
    assert!(parsed["metadata"]["row_count"].as_u64().unwrap() > 0);
}

#[test]
fn test_cli_unsupported_combination_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path());

    let (_stdout, stderr, exit_code) =
        run_cli_command(&["--config", &config, "run", "-d", "ecommerce", "-b", "flat-file"]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "does not support the E-commerce Data dataset");
}

#[test]
fn test_cli_rejects_filters_for_other_dataset() {
    let (_stdout, stderr, exit_code) =
        run_cli_command(&["run", "-d", "census", "-b", "relational", "--category", "Books"]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "apply to the e-commerce dataset only");
}

use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::{CliArgs, Commands, DataFormat, OutputFormat, OutputFormatter};
use crate::engine::{
    catalog::QueryCatalog,
    harness::BenchmarkHarness,
    presenter::{normalize, present, present_log},
};
use crate::executors::{open_store, DocumentExecutor, ExecutorRegistry, FlatFileExecutor, PostgresExecutor};
use crate::generator::{self, CensusGenerator, EcommerceGenerator};
use crate::loader::{self, LoadReport, RelationalLoader};
use crate::querylog::open_sink;
use crate::utils::{
    config::BenchConfig,
    error::{BenchError, BenchResult},
    types::{Backend, CensusFilters, Complexity, Dataset, EcommerceFilters, FilterParams},
};

/// Filters used when filling the query log
pub fn population_params(dataset: Dataset) -> FilterParams {
    match dataset {
        Dataset::Census => FilterParams::Census(CensusFilters {
            age_min: 20,
            age_max: 60,
            income_threshold: 30_000,
            sex_options: vec![0, 1],
        }),
        Dataset::Ecommerce => FilterParams::Ecommerce(EcommerceFilters {
            price_min: 10.0,
            price_max: 500.0,
            categories: vec!["Electronics".to_string(), "Books".to_string(), "Clothing".to_string()],
        }),
    }
}

/// Counters reported at the end of a populate run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub logged: usize,
    pub failed: usize,
    pub log_failures: usize,
    pub skipped: usize,
}

/// Pacing and backend selection for a populate run
#[derive(Debug, Clone)]
pub struct PopulatePlan {
    pub iterations: usize,
    pub delay: Duration,
    pub pause: Duration,
    pub backends: Vec<Backend>,
}

/// Main CLI runner that handles command execution
pub struct CliRunner {
    harness: BenchmarkHarness,
}

impl CliRunner {
    /// Build executors and the query log sink from configuration.
    /// Nothing connects until the first query.
    pub fn new(config: &BenchConfig) -> BenchResult<Self> {
        let mut executors = ExecutorRegistry::new();
        executors.register(Box::new(FlatFileExecutor::new(&config.flat_file)?))?;
        executors.register(Box::new(PostgresExecutor::new(&config.relational)?))?;
        executors.register(Box::new(DocumentExecutor::from_config(&config.document)))?;

        let sink = open_sink(&config.query_log)?;
        let harness = BenchmarkHarness::new(QueryCatalog::standard()?, executors, sink);
        Ok(Self::with_harness(harness))
    }

    pub fn with_harness(harness: BenchmarkHarness) -> Self {
        Self { harness }
    }

    pub fn harness(&self) -> &BenchmarkHarness {
        &self.harness
    }

    /// Run one query and render its result, timing and optional chart
    pub async fn run_query(
        &self,
        dataset: Dataset,
        backend: Backend,
        complexity: Complexity,
        params: &FilterParams,
        format: &OutputFormat,
        chart: bool,
    ) -> BenchResult<String> {
        let run = self.harness.run(dataset, backend, complexity, params).await?;
        let table = normalize(dataset, complexity, &run.result.table)?;

        let mut output = OutputFormatter::format_timed_result(&table, run.result.duration, format);
        if *format == OutputFormat::Csv {
            eprintln!("{}", OutputFormatter::format_duration(run.result.duration));
        }

        // A failed append never hides the timing already rendered above
        let log_line = match &run.log {
            Ok(record) => OutputFormatter::format_info(&format!("Logged as query log record {}", record.id)),
            Err(e) => OutputFormatter::format_warning(&format!("query was not logged: {}", e)),
        };
        if *format == OutputFormat::Table {
            output.push_str(&log_line);
            output.push('\n');
        } else {
            eprintln!("{}", log_line);
        }
        if chart {
            output.push('\n');
            output.push_str(&OutputFormatter::format_presentation(&present(dataset, complexity, &table)?));
            output.push('\n');
        }
        Ok(output)
    }

    /// Run every supported (dataset, complexity, backend) combination
    /// `plan.iterations` times. Failures are counted and never stop the run.
    pub async fn populate(&self, plan: &PopulatePlan) -> PopulateSummary {
        let mut summary = PopulateSummary::default();

        for iteration in 1..=plan.iterations {
            for dataset in Dataset::ALL {
                let params = population_params(dataset);
                for complexity in Complexity::ALL {
                    for backend in &plan.backends {
                        if self.harness.catalog().resolve(dataset, *backend, complexity).is_err() {
                            summary.skipped += 1;
                            continue;
                        }

                        match self.harness.run(dataset, *backend, complexity, &params).await {
                            Ok(run) => {
                                if run.log.is_ok() {
                                    summary.logged += 1;
                                } else {
                                    summary.log_failures += 1;
                                }
                            }
                            Err(e) => {
                                warn!(iteration, %dataset, %backend, %complexity, error = %e, "populate query failed");
                                summary.failed += 1;
                            }
                        }
                        tokio::time::sleep(plan.delay).await;
                    }
                }
            }
            info!(iteration, logged = summary.logged, failed = summary.failed, "iteration finished");
            if iteration < plan.iterations {
                tokio::time::sleep(plan.pause).await;
            }
        }

        summary
    }

    /// Summarize the query log
    pub async fn report(&self, format: &OutputFormat, chart: bool) -> BenchResult<String> {
        let records = self.harness.sink().read_all().await?;
        let reports = present_log(&records);
        Ok(OutputFormatter::format_reports(&reports, format, chart))
    }
}

/// Write `count` synthetic records for `dataset` to `output`
pub fn generate(
    dataset: Dataset,
    count: usize,
    seed: u64,
    output: &Path,
    format: Option<DataFormat>,
) -> BenchResult<String> {
    match dataset {
        Dataset::Census => {
            let records = CensusGenerator::new(seed).records(count);
            match format.unwrap_or(DataFormat::Csv) {
                DataFormat::Csv => generator::write_csv(output, &records)?,
                DataFormat::Json => generator::write_json_array(output, &records)?,
                DataFormat::Jsonl => generator::write_json_lines(output, &records)?,
            }
        }
        Dataset::Ecommerce => {
            let products = EcommerceGenerator::new(seed).products(count);
            match format.unwrap_or(DataFormat::Json) {
                DataFormat::Csv => {
                    return Err(BenchError::Configuration(
                        "e-commerce products are nested and cannot be written as csv".to_string(),
                    ))
                }
                DataFormat::Json => generator::write_json_array(output, &products)?,
                DataFormat::Jsonl => generator::write_json_lines(output, &products)?,
            }
        }
    }
    info!(%dataset, count, seed, path = %output.display(), "dataset written");
    Ok(format!("Wrote {} {} records to {}", count, dataset, output.display()))
}

/// Load `input` into the backend `backend` as configured
pub async fn load(config: &BenchConfig, dataset: Dataset, backend: Backend, input: &Path) -> BenchResult<LoadReport> {
    match backend {
        Backend::Relational => {
            RelationalLoader::new(&config.relational)?
                .load(dataset, input, &config.flat_file)
                .await
        }
        Backend::Document => {
            let store = open_store(&config.document);
            loader::load_documents(store.as_ref(), dataset, input, &config.flat_file).await
        }
        Backend::FlatFile => Err(BenchError::Configuration(
            "the flat-file backend reads its source in place; list the file under flat_file.sources".to_string(),
        )),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins unless `verbose` is set.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dbbench=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbbench=info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> BenchResult<BenchConfig> {
    match path {
        Some(path) => BenchConfig::from_file(path),
        None => Ok(BenchConfig::default()),
    }
}

fn exit_on_error<T>(result: BenchResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}", OutputFormatter::format_error(&e));
            std::process::exit(1);
        }
    }
}

/// Main entry point for CLI execution
pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Catalog => {
            let catalog = exit_on_error(QueryCatalog::standard());
            println!("{}", OutputFormatter::format_catalog(&catalog));
        }

        Commands::Generate {
            dataset,
            count,
            seed,
            output,
            format,
        } => {
            let message = exit_on_error(generate(dataset, count, seed, &output, format));
            println!("{}", OutputFormatter::format_success(&message));
        }

        Commands::Load { dataset, backend, input } => {
            let config = exit_on_error(load_config(args.config.as_ref()));
            let report = exit_on_error(load(&config, dataset, backend, &input).await);
            println!("{}", OutputFormatter::format_success(&report.message()));
        }

        Commands::Run {
            dataset,
            backend,
            complexity,
            filters,
            format,
            chart,
        } => {
            let config = exit_on_error(load_config(args.config.as_ref()));
            let params = exit_on_error(filters.to_params(dataset));
            let runner = exit_on_error(CliRunner::new(&config));
            let output = exit_on_error(runner.run_query(dataset, backend, complexity, &params, &format, chart).await);
            println!("{}", output);
        }

        Commands::Populate {
            iterations,
            delay_ms,
            pause_ms,
            backend,
        } => {
            let config = exit_on_error(load_config(args.config.as_ref()));
            let runner = exit_on_error(CliRunner::new(&config));
            let plan = PopulatePlan {
                iterations,
                delay: Duration::from_millis(delay_ms),
                pause: Duration::from_millis(pause_ms),
                backends: backend,
            };
            let summary = runner.populate(&plan).await;

            println!(
                "{}",
                OutputFormatter::format_success(&format!(
                    "{} queries logged to {}",
                    summary.logged.to_string().green().bold(),
                    runner.harness().sink().describe()
                ))
            );
            if summary.failed > 0 || summary.log_failures > 0 {
                println!(
                    "{}",
                    OutputFormatter::format_warning(&format!(
                        "{} queries failed, {} results could not be logged",
                        summary.failed, summary.log_failures
                    ))
                );
            }
            if summary.skipped > 0 {
                println!(
                    "{}",
                    OutputFormatter::format_info(&format!("{} unsupported combinations skipped", summary.skipped))
                );
            }
        }

        Commands::Report { format, chart } => {
            let config = exit_on_error(load_config(args.config.as_ref()));
            let runner = exit_on_error(CliRunner::new(&config));
            let output = exit_on_error(runner.report(&format, chart).await);
            println!("{}", output);
        }
    }

    Ok(())
}

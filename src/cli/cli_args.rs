use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::utils::{
    error::{BenchResult, ConnectorError},
    types::{Backend, CensusFilters, Complexity, Dataset, EcommerceFilters, FilterParams},
};

/// dbbench CLI - compare query latency across flat-file, relational and document backends
#[derive(Parser, Debug)]
#[command(name = "dbbench")]
#[command(about = "Query-complexity benchmark over flat-file, relational and document backends")]
#[command(version = "0.1.0")]
pub struct CliArgs {
    /// Configuration file (JSON); defaults are used when absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one query, print its result and log its duration
    Run {
        #[arg(short, long, value_enum)]
        dataset: Dataset,

        #[arg(short, long, value_enum)]
        backend: Backend,

        #[arg(short = 'q', long, value_enum, default_value = "simple")]
        complexity: Complexity,

        #[command(flatten)]
        filters: FilterArgs,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Also print the chart specification as JSON
        #[arg(long)]
        chart: bool,
    },

    /// Repeatedly run every tier to fill the query log
    Populate {
        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: usize,

        /// Pause between two queries
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,

        /// Pause between two iterations
        #[arg(long, default_value_t = 500)]
        pause_ms: u64,

        /// Backends to exercise
        #[arg(short, long, value_enum, value_delimiter = ',', default_values_t = [Backend::Relational, Backend::Document])]
        backend: Vec<Backend>,
    },

    /// Summarize the query log per dataset
    Report {
        /// Output format for the summaries
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Also print the box chart specifications as JSON
        #[arg(long)]
        chart: bool,
    },

    /// List every catalog entry
    Catalog,

    /// Write a synthetic dataset
    Generate {
        #[arg(short, long, value_enum)]
        dataset: Dataset,

        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,

        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        #[arg(short, long)]
        output: PathBuf,

        /// File layout; census defaults to csv, e-commerce to json
        #[arg(short, long, value_enum)]
        format: Option<DataFormat>,
    },

    /// Load a dataset file into the relational or document backend
    Load {
        #[arg(short, long, value_enum)]
        dataset: Dataset,

        #[arg(short, long, value_enum)]
        backend: Backend,

        /// Census CSV, or product documents as written by `generate`
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Filter overrides; unset values keep the dataset defaults
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub age_min: Option<i64>,

    #[arg(long)]
    pub age_max: Option<i64>,

    #[arg(long)]
    pub income_threshold: Option<i64>,

    /// Sex codes to include, comma separated
    #[arg(long = "sex", value_delimiter = ',')]
    pub sex_options: Vec<i64>,

    #[arg(long)]
    pub price_min: Option<f64>,

    #[arg(long)]
    pub price_max: Option<f64>,

    /// Categories to include, comma separated
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<String>,
}

impl FilterArgs {
    fn has_census(&self) -> bool {
        self.age_min.is_some() || self.age_max.is_some() || self.income_threshold.is_some() || !self.sex_options.is_empty()
    }

    fn has_ecommerce(&self) -> bool {
        self.price_min.is_some() || self.price_max.is_some() || !self.categories.is_empty()
    }

    /// Merge the overrides into the default filters of `dataset`
    pub fn to_params(&self, dataset: Dataset) -> BenchResult<FilterParams> {
        match dataset {
            Dataset::Census => {
                if self.has_ecommerce() {
                    return Err(ConnectorError::InvalidParameters(
                        "price and category filters apply to the e-commerce dataset only".to_string(),
                    )
                    .into());
                }
                let defaults = CensusFilters::default();
                Ok(FilterParams::Census(CensusFilters {
                    age_min: self.age_min.unwrap_or(defaults.age_min),
                    age_max: self.age_max.unwrap_or(defaults.age_max),
                    income_threshold: self.income_threshold.unwrap_or(defaults.income_threshold),
                    sex_options: if self.sex_options.is_empty() {
                        defaults.sex_options
                    } else {
                        self.sex_options.clone()
                    },
                }))
            }
            Dataset::Ecommerce => {
                if self.has_census() {
                    return Err(ConnectorError::InvalidParameters(
                        "age, income and sex filters apply to the census dataset only".to_string(),
                    )
                    .into());
                }
                let defaults = EcommerceFilters::default();
                Ok(FilterParams::Ecommerce(EcommerceFilters {
                    price_min: self.price_min.unwrap_or(defaults.price_min),
                    price_max: self.price_max.unwrap_or(defaults.price_max),
                    categories: if self.categories.is_empty() {
                        defaults.categories
                    } else {
                        self.categories.clone()
                    },
                }))
            }
        }
    }
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output
    Table,
    /// JSON output
    Json,
    /// CSV output
    Csv,
}

/// Layout of generated data files
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    /// One JSON array
    Json,
    /// One JSON document per line
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = CliArgs::try_parse_from([
            "dbbench", "run", "--dataset", "ecommerce", "--backend", "document", "-q", "complex", "--category",
            "Books,Toys", "--price-max", "250",
        ])
        .unwrap();

        match args.command {
            Commands::Run {
                dataset,
                backend,
                complexity,
                filters,
                format,
                chart,
            } => {
                assert_eq!(dataset, Dataset::Ecommerce);
                assert_eq!(backend, Backend::Document);
                assert_eq!(complexity, Complexity::Complex);
                assert_eq!(format, OutputFormat::Table);
                assert!(!chart);
                assert_eq!(filters.categories, vec!["Books".to_string(), "Toys".to_string()]);
                assert_eq!(
                    filters.to_params(dataset).unwrap(),
                    FilterParams::Ecommerce(EcommerceFilters {
                        price_min: 0.0,
                        price_max: 250.0,
                        categories: vec!["Books".to_string(), "Toys".to_string()],
                    })
                );
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_populate_defaults() {
        let args = CliArgs::try_parse_from(["dbbench", "--verbose", "populate"]).unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Populate {
                iterations,
                delay_ms,
                pause_ms,
                backend,
            } => {
                assert_eq!(iterations, 100);
                assert_eq!(delay_ms, 100);
                assert_eq!(pause_ms, 500);
                assert_eq!(backend, vec![Backend::Relational, Backend::Document]);
            }
            other => panic!("Expected populate command, got {:?}", other),
        }
    }

    #[test]
    fn test_filters_for_wrong_dataset_rejected() {
        let filters = FilterArgs {
            age_min: Some(20),
            ..FilterArgs::default()
        };
        assert!(filters.to_params(Dataset::Ecommerce).is_err());

        let census = filters.to_params(Dataset::Census).unwrap();
        assert_eq!(
            census,
            FilterParams::Census(CensusFilters {
                age_min: 20,
                ..CensusFilters::default()
            })
        );
    }

    #[test]
    fn test_parse_load_command() {
        let args =
            CliArgs::try_parse_from(["dbbench", "load", "-d", "ecommerce", "-b", "relational", "-i", "products.json"])
                .unwrap();
        match args.command {
            Commands::Load { dataset, backend, input } => {
                assert_eq!(dataset, Dataset::Ecommerce);
                assert_eq!(backend, Backend::Relational);
                assert_eq!(input, PathBuf::from("products.json"));
            }
            other => panic!("Expected load command, got {:?}", other),
        }
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }
}

pub mod cli;
pub mod engine;
pub mod executors;
pub mod generator;
pub mod loader;
pub mod querylog;
pub mod utils;

pub use engine::{BenchmarkHarness, QueryCatalog};
pub use executors::{BackendExecutor, ExecutorRegistry};
pub use querylog::QueryLogSink;
pub use utils::{BenchConfig, BenchError, BenchResult};

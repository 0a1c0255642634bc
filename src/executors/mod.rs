pub mod executor_trait;
pub mod file_executor;
pub mod postgres_executor;
pub mod document_executor;
pub mod local_store;

pub use executor_trait::*;
pub use file_executor::FlatFileExecutor;
pub use postgres_executor::PostgresExecutor;
pub use document_executor::{open_store, DocumentExecutor, DocumentStore, MongoStore};
pub use local_store::LocalDocumentStore;

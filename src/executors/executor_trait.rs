use async_trait::async_trait;
use std::collections::HashMap;

use crate::engine::catalog::QueryDescriptor;
use crate::utils::{
    error::{BenchError, BenchResult, ConnectorError},
    types::{Backend, FilterParams, ResultTable},
};

/// Runs a resolved query descriptor against one backend
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    /// Execute the descriptor with the given filters and return the complete table
    async fn execute(&self, descriptor: &QueryDescriptor, params: &FilterParams) -> BenchResult<ResultTable>;

    /// Backend this executor serves
    fn backend(&self) -> Backend;

    /// Free-form description of the target, for diagnostics
    fn describe(&self) -> String {
        self.backend().label().to_string()
    }
}

/// Reject descriptors meant for another backend
pub(crate) fn ensure_backend(executor: Backend, descriptor: &QueryDescriptor) -> BenchResult<()> {
    if descriptor.backend != executor {
        return Err(ConnectorError::QueryFailed(format!(
            "{} executor cannot run a {} descriptor",
            executor, descriptor.backend
        ))
        .into());
    }
    Ok(())
}

/// Registry for executor instances, one per backend
pub struct ExecutorRegistry {
    executors: HashMap<Backend, Box<dyn BackendExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor under the backend it reports
    pub fn register(&mut self, executor: Box<dyn BackendExecutor>) -> BenchResult<()> {
        let backend = executor.backend();
        if self.executors.contains_key(&backend) {
            return Err(BenchError::Configuration(format!(
                "An executor for {} is already registered",
                backend
            )));
        }

        self.executors.insert(backend, executor);
        Ok(())
    }

    pub fn get(&self, backend: Backend) -> Option<&dyn BackendExecutor> {
        self.executors.get(&backend).map(|e| e.as_ref())
    }

    pub fn unregister(&mut self, backend: Backend) -> Option<Box<dyn BackendExecutor>> {
        self.executors.remove(&backend)
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.executors.contains_key(&backend)
    }

    /// Registered backends in declaration order
    pub fn backends(&self) -> Vec<Backend> {
        Backend::ALL.iter().copied().filter(|b| self.contains(*b)).collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::{ColumnMetadata, DataType, Row, Value};

    struct TestExecutor {
        backend: Backend,
    }

    #[async_trait]
    impl BackendExecutor for TestExecutor {
        async fn execute(&self, descriptor: &QueryDescriptor, _params: &FilterParams) -> BenchResult<ResultTable> {
            ensure_backend(self.backend, descriptor)?;
            Ok(ResultTable::new(
                vec![ColumnMetadata::new("n", DataType::Integer)],
                vec![Row::new(vec![Value::Integer(1)])],
            ))
        }

        fn backend(&self) -> Backend {
            self.backend
        }
    }

    #[test]
    fn test_executor_registry_creation() {
        let registry = ExecutorRegistry::default();

        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.backends().is_empty());
    }

    #[test]
    fn test_executor_registry_register_and_get() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Box::new(TestExecutor { backend: Backend::Document })).unwrap();
        registry.register(Box::new(TestExecutor { backend: Backend::FlatFile })).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(Backend::Document));
        assert!(registry.get(Backend::Relational).is_none());
        assert_eq!(registry.get(Backend::FlatFile).unwrap().describe(), "Flat File");
        assert_eq!(registry.backends(), vec![Backend::FlatFile, Backend::Document]);
    }

    #[test]
    fn test_executor_registry_duplicate_registration() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Box::new(TestExecutor { backend: Backend::Relational })).unwrap();

        let result = registry.register(Box::new(TestExecutor { backend: Backend::Relational }));
        assert!(matches!(result, Err(BenchError::Configuration(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_executor_registry_unregister() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Box::new(TestExecutor { backend: Backend::Relational })).unwrap();

        assert!(registry.unregister(Backend::Relational).is_some());
        assert!(registry.unregister(Backend::Relational).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_backend_rejects_foreign_descriptor() {
        let catalog = crate::engine::catalog::QueryCatalog::standard().unwrap();
        let descriptor = catalog
            .resolve(
                crate::utils::types::Dataset::Census,
                Backend::Relational,
                crate::utils::types::Complexity::Simple,
            )
            .unwrap();
        let executor = TestExecutor { backend: Backend::Document };

        let err = executor
            .execute(descriptor, &FilterParams::default_for(crate::utils::types::Dataset::Census))
            .await
            .unwrap_err();
        assert!(err.is_query_failure());
    }
}

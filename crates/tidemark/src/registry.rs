//! Dialect registration.
//!
//! Maps dialect names to generators and processor factories. Lookups are
//! exact; a miss is an [`MigrateError::UnknownDialect`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::generator::{Generator, SqlGenerator};
use crate::processor::{Processor, ProcessorFactory, SqliteProcessorFactory};

/// Registry of known dialects.
#[derive(Default)]
pub struct DialectRegistry {
    generators: BTreeMap<String, Arc<dyn Generator>>,
    factories: BTreeMap<String, Arc<dyn ProcessorFactory>>,
}

impl DialectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with `sqlite` (processor and generator) and
    /// `postgres` (generator only).
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(SqliteProcessorFactory)
            .register_generator(Arc::new(SqlGenerator::postgres()));
        registry
    }

    /// Registers a processor factory and its generator.
    pub fn register(&mut self, factory: impl ProcessorFactory + 'static) -> &mut Self {
        let name = factory.dialect().to_string();
        self.generators.insert(name.clone(), factory.generator());
        self.factories.insert(name, Arc::new(factory));
        self
    }

    /// Registers a generator without a processor, for rendering only.
    pub fn register_generator(&mut self, generator: Arc<dyn Generator>) -> &mut Self {
        self.generators
            .insert(generator.dialect().to_string(), generator);
        self
    }

    /// Returns the registered dialect names, sorted.
    #[must_use]
    pub fn dialects(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }

    /// Looks up a generator.
    pub fn generator(&self, name: &str) -> Result<Arc<dyn Generator>> {
        self.generators
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::UnknownDialect(name.to_string()))
    }

    /// Opens a processor for `name` on `connection`.
    pub async fn processor(&self, name: &str, connection: &str) -> Result<Box<dyn Processor>> {
        let Some(factory) = self.factories.get(name) else {
            if self.generators.contains_key(name) {
                return Err(MigrateError::UnsupportedFeature {
                    dialect: name.to_string(),
                    feature: "executing migrations (no processor registered)".to_string(),
                });
            }
            return Err(MigrateError::UnknownDialect(name.to_string()));
        };

        debug!(dialect = %name, "Creating processor");
        factory.create(connection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = DialectRegistry::with_defaults();
        assert_eq!(registry.dialects(), vec!["postgres", "sqlite"]);
        assert_eq!(registry.generator("postgres").unwrap().dialect(), "postgres");
    }

    #[test]
    fn test_unknown_dialect() {
        let registry = DialectRegistry::with_defaults();
        match registry.generator("oracle") {
            Err(MigrateError::UnknownDialect(name)) => assert_eq!(name, "oracle"),
            Err(other) => panic!("Expected UnknownDialect, got {other:?}"),
            Ok(_) => panic!("Expected UnknownDialect"),
        }
        // Lookups are exact
        assert!(registry.generator("SQLite").is_err());
    }

    #[tokio::test]
    async fn test_processor_lookup() {
        let registry = DialectRegistry::with_defaults();

        let processor = registry.processor("sqlite", "sqlite::memory:").await.unwrap();
        assert_eq!(processor.dialect(), "sqlite");

        assert!(matches!(
            registry.processor("postgres", "postgres://localhost/app").await,
            Err(MigrateError::UnsupportedFeature { .. })
        ));
        assert!(matches!(
            registry.processor("mysql", "mysql://localhost/app").await,
            Err(MigrateError::UnknownDialect(_))
        ));
    }
}

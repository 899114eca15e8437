//! Versioned database schema migrations.
//!
//! `tidemark` applies schema changes that are written in Rust and compiled
//! into the host program:
//! - Each migration has a unique version and describes its changes with a
//!   [`MigrationContext`](context::MigrationContext)
//! - Applied versions are recorded in a version table in the target database
//! - SQL generation is dialect-aware (SQLite, PostgreSQL)
//! - Each migration runs in its own transaction and is rolled back on failure
//!
//! # Architecture
//!
//! - **Expressions** - Schema and data changes like `CreateTable`, `CreateIndex`, `InsertData`
//! - **Generators** - Turn expressions into dialect-specific SQL
//! - **Processors** - Run SQL against a database and answer existence queries
//! - **Loader** - Filters registered migrations by namespace and tags
//! - **Ledger** - Reads and writes the version table
//! - **Runner** - Computes the plan and executes it
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//!
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl Migration for CreateUsers {
//!     async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
//!         ctx.create_table(
//!             "users",
//!             [
//!                 ColumnDefinition::new("id", SqlType::BigInt).primary_key().identity(),
//!                 ColumnDefinition::new("name", SqlType::Varchar(100)).not_null(),
//!             ],
//!         );
//!         Ok(())
//!     }
//! }
//!
//! impl VersionedMigration for CreateUsers {
//!     const VERSION: i64 = 1;
//! }
//!
//! let mut registrar = MigrationRegistrar::new();
//! registrar.add(CreateUsers);
//! let catalog = MigrationLoader::default().load(&registrar)?;
//! let processor = SqliteProcessor::connect("sqlite:app.db").await?;
//! let mut runner = MigrationRunner::new(Box::new(processor), catalog);
//! runner.migrate_up(None).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending migrations
//! my-app up
//!
//! # Show migration status
//! my-app list
//!
//! # Revert the last migration
//! my-app rollback
//!
//! # Print the SQL without running it
//! my-app sql
//! ```

pub mod cli;
pub mod context;
pub mod error;
pub mod expression;
pub mod generator;
pub mod ledger;
pub mod loader;
pub mod migration;
pub mod processor;
pub mod registry;
pub mod runner;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::context::MigrationContext;
    pub use crate::error::{MigrateError, Result};
    pub use crate::expression::{
        CreateTableExpression, DataRow, DeleteDataExpression, Expression, InsertDataExpression,
        UpdateDataExpression,
    };
    pub use crate::generator::{Generator, SqlGenerator};
    pub use crate::ledger::{VersionLedger, VersionTableMetaData};
    pub use crate::loader::{LoaderFilter, MigrationLoader, MigrationRegistrar, TagMatch};
    pub use crate::migration::{
        ConstraintContext, Migration, MigrationConstraint, MigrationInfo, TransactionBehavior,
        VersionedMigration,
    };
    pub use crate::processor::{Processor, SqliteProcessor};
    pub use crate::registry::DialectRegistry;
    pub use crate::runner::{MigrationReport, MigrationRunner, RunnerOptions};
    pub use crate::schema::{
        ColumnDefinition, ConstraintDefinition, Direction, ForeignKeyAction,
        ForeignKeyDefinition, IndexDefinition, SequenceDefinition, SqlType, SqlValue,
    };
    pub use async_trait::async_trait;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    struct CreateWidgets;

    #[async_trait]
    impl Migration for CreateWidgets {
        async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
            ctx.create_table(
                "widgets",
                [ColumnDefinition::new("id", SqlType::BigInt).primary_key()],
            );
            Ok(())
        }
    }

    impl VersionedMigration for CreateWidgets {
        const VERSION: i64 = 7;
        const TAGS: &'static [&'static str] = &["TenantA"];
    }

    #[test]
    fn test_versioned_migration() {
        let info = CreateWidgets.into_info();
        assert_eq!(info.version(), 7);
        assert_eq!(info.description(), "CreateWidgets");
        assert_eq!(info.namespace(), Some("tidemark::tests"));
        assert!(info.tags().contains("TenantA"));
    }

    #[tokio::test]
    async fn test_prelude_round_trip() {
        let mut registrar = MigrationRegistrar::new();
        registrar.add(CreateWidgets);
        let catalog = MigrationLoader::default().load(&registrar).unwrap();

        let processor = SqliteProcessor::connect("sqlite::memory:").await.unwrap();
        let mut runner = MigrationRunner::new(Box::new(processor), catalog);

        let report = runner.migrate_up(None).await.unwrap();
        assert_eq!(report.applied, vec![7]);

        let report = runner.rollback(1).await.unwrap();
        assert_eq!(report.reverted, vec![7]);
        assert!(runner.applied_versions().await.unwrap().is_empty());
    }
}

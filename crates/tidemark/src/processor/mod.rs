//! Database processors.
//!
//! A [`Processor`] wraps one live connection. It executes rendered SQL,
//! manages the transaction around a migration, and answers the existence
//! queries migrations use to make decisions. Processors are created by a
//! [`ProcessorFactory`] looked up in the dialect registry.

mod sqlite;

pub use sqlite::{SqliteProcessor, SqliteProcessorFactory};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::generator::Generator;
use crate::schema::SqlValue;

/// A raw version table row: version, applied-on text, description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRow {
    /// Migration version.
    pub version: i64,
    /// When the migration was applied, as stored.
    pub applied_on: Option<String>,
    /// Migration description.
    pub description: Option<String>,
}

/// Executes SQL against one database connection.
///
/// While a transaction is open every call, existence queries included, runs
/// inside it. Dropping a processor with an open transaction rolls it back.
#[async_trait]
pub trait Processor: Send {
    /// Returns the generator matching this processor's database.
    fn generator(&self) -> &dyn Generator;

    /// Returns the dialect name.
    fn dialect(&self) -> &str {
        self.generator().dialect()
    }

    /// Executes one or more statements.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Begins a transaction. Fails if one is already open.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Drops the open transaction without waiting for the database.
    ///
    /// Used when an operation is cancelled mid-transaction and `rollback`
    /// can no longer be awaited. The driver rolls the transaction back before
    /// the connection is used again. Returns true if a transaction was open.
    fn discard_transaction(&mut self) -> bool;

    /// Checks whether a schema exists.
    async fn schema_exists(&mut self, schema: &str) -> Result<bool>;

    /// Checks whether a table exists.
    async fn table_exists(&mut self, schema: Option<&str>, table: &str) -> Result<bool>;

    /// Checks whether a column exists.
    async fn column_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
    ) -> Result<bool>;

    /// Checks whether an index exists on a table.
    async fn index_exists(&mut self, schema: Option<&str>, table: &str, index: &str)
        -> Result<bool>;

    /// Checks whether a named constraint exists on a table.
    async fn constraint_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &str,
    ) -> Result<bool>;

    /// Checks whether a sequence exists.
    async fn sequence_exists(&mut self, schema: Option<&str>, sequence: &str) -> Result<bool>;

    /// Checks whether a column's default equals `value`.
    async fn default_value_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<bool>;

    /// Runs a version table query selecting version, applied-on and description.
    async fn fetch_version_rows(&mut self, sql: &str) -> Result<Vec<VersionRow>>;
}

/// Creates processors for one dialect.
#[async_trait]
pub trait ProcessorFactory: Send + Sync {
    /// Returns the dialect name.
    fn dialect(&self) -> &str;

    /// Returns the generator processors of this factory use.
    fn generator(&self) -> Arc<dyn Generator>;

    /// Opens a connection and wraps it in a processor.
    async fn create(&self, connection: &str) -> Result<Box<dyn Processor>>;
}

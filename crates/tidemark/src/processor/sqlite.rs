//! SQLite processor over a single-connection `sqlx` pool.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, Transaction};
use tracing::{debug, warn};

use super::{Processor, ProcessorFactory, VersionRow};
use crate::error::{MigrateError, Result};
use crate::generator::{Generator, SqlGenerator};
use crate::schema::SqlValue;

const MAIN_SCHEMA: &str = "main";

/// Processor for SQLite databases.
///
/// The pool holds exactly one connection so that in-memory databases keep
/// their contents and every statement sees the open transaction.
pub struct SqliteProcessor {
    pool: SqlitePool,
    transaction: Option<Transaction<'static, Sqlite>>,
    generator: SqlGenerator,
}

impl SqliteProcessor {
    /// Connects to `url` (e.g. `sqlite::memory:` or `sqlite://app.db`),
    /// creating the database file if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        debug!(url = %url, "Connected to SQLite database");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. The pool should hold a single connection.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            transaction: None,
            generator: SqlGenerator::sqlite(),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs a `COUNT(*)` query with string binds and reports whether it found anything.
    async fn exists(&mut self, sql: &str, binds: &[&str]) -> Result<bool> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for bind in binds {
            query = query.bind((*bind).to_string());
        }

        let count = match self.transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        Ok(count > 0)
    }

    fn catalog(&self, schema: Option<&str>) -> String {
        format!(
            "{}.sqlite_master",
            self.generator.quote_identifier(schema.unwrap_or(MAIN_SCHEMA))
        )
    }
}

#[async_trait]
impl Processor for SqliteProcessor {
    fn generator(&self) -> &dyn Generator {
        &self.generator
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");

        let result = match self.transaction.as_mut() {
            Some(tx) => {
                let conn: &mut SqliteConnection = &mut *tx;
                Executor::execute(conn, sqlx::raw_sql(sql)).await
            }
            None => Executor::execute(&self.pool, sqlx::raw_sql(sql)).await,
        };

        result
            .map(|_| ())
            .map_err(|e| MigrateError::SqlExecution {
                sql: sql.to_string(),
                detail: e.to_string(),
            })
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(MigrateError::TransactionState(
                "a transaction is already open".to_string(),
            ));
        }
        self.transaction = Some(self.pool.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.transaction.take().ok_or_else(|| {
            MigrateError::TransactionState("no open transaction to commit".to_string())
        })?;
        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.transaction.take().ok_or_else(|| {
            MigrateError::TransactionState("no open transaction to roll back".to_string())
        })?;
        tx.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn discard_transaction(&mut self) -> bool {
        // sqlx queues a ROLLBACK on the connection when the transaction drops
        let discarded = self.transaction.take().is_some();
        if discarded {
            warn!("Open transaction discarded, rolling back");
        }
        discarded
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        self.exists(
            "SELECT COUNT(*) FROM pragma_database_list WHERE name = ?",
            &[schema],
        )
        .await
    }

    async fn table_exists(&mut self, schema: Option<&str>, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE type = 'table' AND lower(name) = lower(?)",
            self.catalog(schema)
        );
        self.exists(&sql, &[table]).await
    }

    async fn column_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
    ) -> Result<bool> {
        self.exists(
            "SELECT COUNT(*) FROM pragma_table_info(?, ?) WHERE lower(name) = lower(?)",
            &[table, schema.unwrap_or(MAIN_SCHEMA), column],
        )
        .await
    }

    async fn index_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        index: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE type = 'index' \
             AND lower(tbl_name) = lower(?) AND lower(name) = lower(?)",
            self.catalog(schema)
        );
        self.exists(&sql, &[table, index]).await
    }

    async fn constraint_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &str,
    ) -> Result<bool> {
        // Unique constraints live as indexes; inline constraints only in the table SQL.
        if self.index_exists(schema, table, constraint).await? {
            return Ok(true);
        }
        let needle = format!(
            "CONSTRAINT {}",
            self.generator.quote_identifier(constraint)
        );
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE type = 'table' \
             AND lower(name) = lower(?) AND instr(sql, ?) > 0",
            self.catalog(schema)
        );
        self.exists(&sql, &[table, needle.as_str()]).await
    }

    async fn sequence_exists(&mut self, _schema: Option<&str>, _sequence: &str) -> Result<bool> {
        Ok(false)
    }

    async fn default_value_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<bool> {
        let query = sqlx::query_scalar::<_, Option<String>>(
            "SELECT dflt_value FROM pragma_table_info(?, ?) WHERE lower(name) = lower(?)",
        )
        .bind(table.to_string())
        .bind(schema.unwrap_or(MAIN_SCHEMA).to_string())
        .bind(column.to_string());

        let default = match self.transaction.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };

        let expected = self.generator.render_value(value);
        Ok(matches!(default, Some(Some(actual)) if actual == expected))
    }

    async fn fetch_version_rows(&mut self, sql: &str) -> Result<Vec<VersionRow>> {
        let query = sqlx::query_as::<_, (i64, Option<String>, Option<String>)>(sql);
        let rows = match self.transaction.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };

        Ok(rows
            .into_iter()
            .map(|(version, applied_on, description)| VersionRow {
                version,
                applied_on,
                description,
            })
            .collect())
    }
}

/// Creates [`SqliteProcessor`]s.
#[derive(Debug, Clone, Default)]
pub struct SqliteProcessorFactory;

#[async_trait]
impl ProcessorFactory for SqliteProcessorFactory {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    fn generator(&self) -> Arc<dyn Generator> {
        Arc::new(SqlGenerator::sqlite())
    }

    async fn create(&self, connection: &str) -> Result<Box<dyn Processor>> {
        Ok(Box::new(SqliteProcessor::connect(connection).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_processor() -> SqliteProcessor {
        SqliteProcessor::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite processor")
    }

    #[tokio::test]
    async fn test_execute_and_table_exists() {
        let mut processor = create_test_processor().await;
        assert!(!processor.table_exists(None, "users").await.unwrap());

        processor
            .execute("CREATE TABLE \"users\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT)")
            .await
            .unwrap();

        assert!(processor.table_exists(None, "users").await.unwrap());
        assert!(processor.table_exists(Some("main"), "Users").await.unwrap());
        assert!(processor.column_exists(None, "users", "name").await.unwrap());
        assert!(!processor.column_exists(None, "users", "email").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_statement_reports_sql() {
        let mut processor = create_test_processor().await;
        let err = processor.execute("CREATE TABLE (").await.unwrap_err();

        match err {
            MigrateError::SqlExecution { sql, detail } => {
                assert_eq!(sql, "CREATE TABLE (");
                assert!(!detail.is_empty());
            }
            other => panic!("Expected SqlExecution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let mut processor = create_test_processor().await;

        processor.begin_transaction().await.unwrap();
        assert!(processor.in_transaction());
        processor.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        assert!(processor.table_exists(None, "t").await.unwrap());
        processor.rollback().await.unwrap();

        assert!(!processor.in_transaction());
        assert!(!processor.table_exists(None, "t").await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_keeps_changes() {
        let mut processor = create_test_processor().await;

        processor.begin_transaction().await.unwrap();
        processor.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        processor.commit().await.unwrap();

        assert!(processor.table_exists(None, "t").await.unwrap());
    }

    #[tokio::test]
    async fn test_discarded_transaction_rolls_back() {
        let mut processor = create_test_processor().await;
        assert!(!processor.discard_transaction());

        processor.begin_transaction().await.unwrap();
        processor.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        assert!(processor.discard_transaction());

        assert!(!processor.in_transaction());
        assert!(!processor.table_exists(None, "t").await.unwrap());
        processor.begin_transaction().await.unwrap();
        processor.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_nested_transaction_is_rejected() {
        let mut processor = create_test_processor().await;
        processor.begin_transaction().await.unwrap();

        assert!(matches!(
            processor.begin_transaction().await,
            Err(MigrateError::TransactionState(_))
        ));
        assert!(matches!(
            create_test_processor().await.commit().await,
            Err(MigrateError::TransactionState(_))
        ));
    }

    #[tokio::test]
    async fn test_index_constraint_and_default_checks() {
        let mut processor = create_test_processor().await;
        processor
            .execute(
                "CREATE TABLE \"users\" (\
                 \"id\" INTEGER, \"status\" TEXT DEFAULT 'active', \
                 CONSTRAINT \"pk_users\" PRIMARY KEY (\"id\"));\n\
                 CREATE UNIQUE INDEX \"uq_users_status\" ON \"users\" (\"status\")",
            )
            .await
            .unwrap();

        assert!(processor.index_exists(None, "users", "uq_users_status").await.unwrap());
        assert!(processor.constraint_exists(None, "users", "uq_users_status").await.unwrap());
        assert!(processor.constraint_exists(None, "users", "pk_users").await.unwrap());
        assert!(!processor.constraint_exists(None, "users", "fk_missing").await.unwrap());
        assert!(processor
            .default_value_exists(None, "users", "status", &"active".into())
            .await
            .unwrap());
        assert!(!processor
            .default_value_exists(None, "users", "status", &"disabled".into())
            .await
            .unwrap());
        assert!(processor.schema_exists("main").await.unwrap());
        assert!(!processor.sequence_exists(None, "seq").await.unwrap());
    }
}

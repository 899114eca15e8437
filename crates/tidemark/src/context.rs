//! Per-execution migration context.

use crate::error::Result;
use crate::expression::{
    CreateTableExpression, DataRow, Expression, InsertDataExpression,
};
use crate::processor::Processor;
use crate::schema::{ColumnDefinition, ForeignKeyDefinition, IndexDefinition, SqlValue};

/// Collects the expressions of one `up` or `down` call.
///
/// The context borrows the runner's processor so migrations can query the
/// live schema while deciding what to emit. Nothing is executed until the
/// migration returns and the runner has validated every expression.
pub struct MigrationContext<'a> {
    processor: &'a mut dyn Processor,
    expressions: Vec<Expression>,
    version: i64,
}

impl<'a> MigrationContext<'a> {
    /// Creates an empty context for migration `version`.
    pub fn new(processor: &'a mut dyn Processor, version: i64) -> Self {
        Self {
            processor,
            expressions: Vec::new(),
            version,
        }
    }

    /// Returns the version of the migration being collected.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the target dialect name.
    #[must_use]
    pub fn dialect(&self) -> &str {
        self.processor.dialect()
    }

    /// Returns true if the target dialect is `name`.
    #[must_use]
    pub fn is_dialect(&self, name: &str) -> bool {
        self.dialect() == name
    }

    /// Appends an expression.
    pub fn push(&mut self, expression: impl Into<Expression>) -> &mut Self {
        self.expressions.push(expression.into());
        self
    }

    /// Returns the expressions collected so far.
    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    /// Consumes the context, returning the expressions in order.
    #[must_use]
    pub fn into_expressions(self) -> Vec<Expression> {
        self.expressions
    }

    /// Creates a second, empty context on the same processor.
    pub(crate) fn scratch(&mut self) -> MigrationContext<'_> {
        MigrationContext::new(&mut *self.processor, self.version)
    }

    // Builder shortcuts

    /// Creates a table with the given columns.
    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = ColumnDefinition>,
    ) -> &mut Self {
        let mut table = CreateTableExpression::new(name);
        table.columns.extend(columns);
        self.push(table)
    }

    /// Drops a table.
    pub fn delete_table(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Expression::delete_table(name))
    }

    /// Adds a column to a table.
    pub fn add_column(&mut self, table: impl Into<String>, column: ColumnDefinition) -> &mut Self {
        self.push(Expression::add_column(table, column))
    }

    /// Creates an index.
    pub fn create_index(&mut self, index: IndexDefinition) -> &mut Self {
        self.push(Expression::create_index(index))
    }

    /// Adds a foreign key.
    pub fn create_foreign_key(&mut self, foreign_key: ForeignKeyDefinition) -> &mut Self {
        self.push(Expression::create_foreign_key(foreign_key))
    }

    /// Inserts one row.
    pub fn insert(&mut self, table: impl Into<String>, row: DataRow) -> &mut Self {
        self.push(InsertDataExpression::new(table).row(row))
    }

    /// Runs raw SQL that cannot be reversed automatically.
    pub fn execute_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.push(Expression::execute_sql(sql, None))
    }

    // Schema queries

    /// Checks whether a schema exists.
    pub async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        self.processor.schema_exists(schema).await
    }

    /// Checks whether a table exists.
    pub async fn table_exists(&mut self, schema: Option<&str>, table: &str) -> Result<bool> {
        self.processor.table_exists(schema, table).await
    }

    /// Checks whether a column exists.
    pub async fn column_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
    ) -> Result<bool> {
        self.processor.column_exists(schema, table, column).await
    }

    /// Checks whether an index exists.
    pub async fn index_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        index: &str,
    ) -> Result<bool> {
        self.processor.index_exists(schema, table, index).await
    }

    /// Checks whether a constraint exists.
    pub async fn constraint_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &str,
    ) -> Result<bool> {
        self.processor
            .constraint_exists(schema, table, constraint)
            .await
    }

    /// Checks whether a sequence exists.
    pub async fn sequence_exists(&mut self, schema: Option<&str>, sequence: &str) -> Result<bool> {
        self.processor.sequence_exists(schema, sequence).await
    }

    /// Checks whether a column's default equals `value`.
    pub async fn default_value_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<bool> {
        self.processor
            .default_value_exists(schema, table, column, value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::SqliteProcessor;
    use crate::schema::SqlType;

    #[tokio::test]
    async fn test_collects_in_order() {
        let mut processor = SqliteProcessor::connect("sqlite::memory:").await.unwrap();
        let mut ctx = MigrationContext::new(&mut processor, 3);

        ctx.create_table(
            "contexts",
            [ColumnDefinition::new("id", SqlType::Integer).primary_key()],
        )
        .insert("contexts", DataRow::new().set("id", 1))
        .execute_sql("PRAGMA optimize");

        assert_eq!(ctx.version(), 3);
        assert!(ctx.is_dialect("sqlite"));

        let expressions = ctx.into_expressions();
        assert_eq!(expressions.len(), 3);
        assert!(matches!(expressions[0], Expression::CreateTable(_)));
        assert!(matches!(expressions[1], Expression::InsertData(_)));
        assert!(matches!(expressions[2], Expression::ExecuteSql(_)));
    }

    #[tokio::test]
    async fn test_queries_see_live_schema() {
        let mut processor = SqliteProcessor::connect("sqlite::memory:").await.unwrap();
        processor
            .execute("CREATE TABLE \"users\" (\"id\" INTEGER)")
            .await
            .unwrap();

        let mut ctx = MigrationContext::new(&mut processor, 1);
        assert!(ctx.table_exists(None, "users").await.unwrap());
        assert!(ctx.column_exists(None, "users", "id").await.unwrap());
        assert!(!ctx.index_exists(None, "users", "ix_users_id").await.unwrap());
        assert!(ctx.expressions().is_empty());
    }
}

//! SQL generation.
//!
//! A [`Generator`] turns one [`Expression`] into dialect-specific SQL. There
//! is a single implementation, [`SqlGenerator`], driven by a
//! [`DialectConfig`] value; each supported database contributes a config.
//!
//! Rendering is pure. When a dialect cannot express a request the generator
//! fails with [`MigrateError::UnsupportedFeature`] rather than emitting
//! approximate SQL. Expressions that need several statements are rendered
//! as one string with statements separated by `";\n"`.

mod postgres;
mod sqlite;

pub use postgres::postgres_config;
pub use sqlite::sqlite_config;

use crate::error::{MigrateError, Result};
use crate::expression::{
    AlterColumnExpression, CreateTableExpression, DataRow, Expression, UpdateDataExpression,
};
use crate::schema::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, Direction, ForeignKeyAction,
    ForeignKeyDefinition, IndexDefinition, SequenceDefinition, SqlType, SqlValue,
};

/// Separator between statements of a multi-statement rendering.
pub const STATEMENT_SEPARATOR: &str = ";\n";

/// Trait for dialect-specific SQL generation.
pub trait Generator: Send + Sync {
    /// Returns the dialect name.
    fn dialect(&self) -> &str;

    /// Renders an expression to SQL.
    fn render(&self, expression: &Expression) -> Result<String>;

    /// Quotes an identifier (table name, column name, etc.) if needed.
    fn quote_identifier(&self, name: &str) -> String;

    /// Renders a literal value.
    fn render_value(&self, value: &SqlValue) -> String;

    /// Returns true if names can be qualified with a schema.
    fn supports_schemas(&self) -> bool;

    /// Quotes a possibly schema-qualified name.
    fn quote_table(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(name)
            ),
            None => self.quote_identifier(name),
        }
    }
}

/// How a dialect declares database-generated integer columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStyle {
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`; the column must be the sole primary key.
    AutoIncrement,
    /// `GENERATED BY DEFAULT AS IDENTITY` after the type.
    GeneratedByDefault,
}

/// Capabilities a dialect may or may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DialectFeatures {
    /// CREATE/DROP SCHEMA and schema-qualified names.
    pub schemas: bool,
    /// CREATE/DROP SEQUENCE.
    pub sequences: bool,
    /// ALTER TABLE ... ALTER COLUMN.
    pub alter_column: bool,
    /// ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY and its DROP.
    pub alter_foreign_keys: bool,
    /// ALTER TABLE ... ADD CONSTRAINT for PRIMARY KEY/UNIQUE and its DROP.
    pub alter_constraints: bool,
    /// UNIQUE constraints emulated with unique indexes.
    pub unique_constraints_as_indexes: bool,
    /// Clustered indexes.
    pub clustered_indexes: bool,
    /// CREATE INDEX CONCURRENTLY.
    pub concurrent_indexes: bool,
    /// Partial indexes (CREATE INDEX ... WHERE).
    pub partial_indexes: bool,
}

/// Everything [`SqlGenerator`] needs to know about one database.
#[derive(Debug, Clone)]
pub struct DialectConfig {
    /// Dialect name used for registry lookups and error messages.
    pub name: &'static str,
    /// Opening identifier quote.
    pub quote_open: char,
    /// Closing identifier quote; doubled when it appears inside a name.
    pub quote_close: char,
    /// Quote every identifier, not only those that need it.
    pub quote_all: bool,
    /// Words that must be quoted when used as identifiers (upper case).
    pub reserved_words: &'static [&'static str],
    /// Maps an abstract type to the dialect's type name.
    pub type_map: fn(&SqlType) -> String,
    /// Identity column style.
    pub identity: IdentityStyle,
    /// Literal for `true`.
    pub true_literal: &'static str,
    /// Literal for `false`.
    pub false_literal: &'static str,
    /// Supported capabilities.
    pub features: DialectFeatures,
}

/// The configurable SQL generator.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    config: DialectConfig,
}

impl SqlGenerator {
    /// Creates a generator for the given dialect configuration.
    #[must_use]
    pub fn new(config: DialectConfig) -> Self {
        Self { config }
    }

    /// Creates a SQLite generator.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::new(sqlite_config())
    }

    /// Creates a PostgreSQL generator.
    #[must_use]
    pub fn postgres() -> Self {
        Self::new(postgres_config())
    }

    /// Returns the dialect configuration.
    #[must_use]
    pub fn config(&self) -> &DialectConfig {
        &self.config
    }

    /// Returns the type name for the given type.
    #[must_use]
    pub fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Custom(name) => name.clone(),
            other => (self.config.type_map)(other),
        }
    }

    fn unsupported(&self, feature: impl Into<String>) -> MigrateError {
        MigrateError::UnsupportedFeature {
            dialect: self.config.name.to_string(),
            feature: feature.into(),
        }
    }

    fn require(&self, supported: bool, feature: &str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(self.unsupported(feature))
        }
    }

    fn needs_quotes(&self, name: &str) -> bool {
        if self.config.quote_all {
            return true;
        }
        let starts_with_digit = name.chars().next().is_some_and(|c| c.is_ascii_digit());
        let has_non_word = name.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        let reserved = self
            .config
            .reserved_words
            .iter()
            .any(|word| word.eq_ignore_ascii_case(name));
        name.is_empty() || starts_with_digit || has_non_word || reserved
    }

    /// Quotes a schema-qualified name, failing if the dialect has no schemas.
    fn qualified(&self, schema: Option<&str>, name: &str) -> Result<String> {
        if schema.is_some() {
            self.require(self.config.features.schemas, "schemas")?;
        }
        Ok(self.quote_table(schema, name))
    }

    fn column_list<S: AsRef<str>>(&self, columns: &[S]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn foreign_key_actions(on_delete: ForeignKeyAction, on_update: ForeignKeyAction) -> String {
        let mut sql = String::new();
        if on_delete != ForeignKeyAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(on_delete.to_sql());
        }
        if on_update != ForeignKeyAction::NoAction {
            sql.push_str(" ON UPDATE ");
            sql.push_str(on_update.to_sql());
        }
        sql
    }

    /// Generates a column definition. `inline_pk` is false when the table
    /// declares a composite primary key at table level.
    fn column_definition(&self, column: &ColumnDefinition, inline_pk: bool) -> Result<String> {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.identity && self.config.identity == IdentityStyle::GeneratedByDefault {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        }

        let is_inline_pk = column.primary_key && inline_pk;
        if is_inline_pk {
            parts.push("PRIMARY KEY".to_string());
        }

        if column.identity && self.config.identity == IdentityStyle::AutoIncrement {
            if !is_inline_pk {
                return Err(self.unsupported(format!(
                    "identity column '{}' that is not the sole primary key",
                    column.name
                )));
            }
            parts.push("AUTOINCREMENT".to_string());
        }

        if !column.nullable && !is_inline_pk {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", self.render_value(default)));
        }

        if let Some(check) = &column.check {
            parts.push(format!("CHECK ({check})"));
        }

        if let Some(reference) = &column.references {
            parts.push(format!(
                "REFERENCES {} ({}){}",
                self.qualified(reference.schema.as_deref(), &reference.table)?,
                self.quote_identifier(&reference.column),
                Self::foreign_key_actions(
                    reference.on_delete.unwrap_or_default(),
                    reference.on_update.unwrap_or_default()
                )
            ));
        }

        Ok(parts.join(" "))
    }

    fn create_table_sql(&self, expr: &CreateTableExpression) -> Result<String> {
        let primary_key = expr.primary_key();
        let inline_pk = primary_key.len() <= 1;

        let mut definitions = expr
            .columns
            .iter()
            .map(|c| self.column_definition(c, inline_pk))
            .collect::<Result<Vec<_>>>()?;

        // Composite primary key goes at table level
        if !inline_pk {
            definitions.push(format!("PRIMARY KEY ({})", self.column_list(&primary_key)));
        }

        Ok(format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualified(expr.schema.as_deref(), &expr.name)?,
            definitions.join(",\n  ")
        ))
    }

    fn alter_column_sql(&self, expr: &AlterColumnExpression) -> Result<String> {
        self.require(self.config.features.alter_column, "altering columns")?;

        let column = &expr.column;
        let name = self.quote_identifier(&column.name);
        let mut actions = vec![format!(
            "ALTER COLUMN {name} TYPE {}",
            self.type_name(&column.sql_type)
        )];
        actions.push(if column.nullable {
            format!("ALTER COLUMN {name} DROP NOT NULL")
        } else {
            format!("ALTER COLUMN {name} SET NOT NULL")
        });
        actions.push(match &column.default {
            Some(default) => format!(
                "ALTER COLUMN {name} SET DEFAULT {}",
                self.render_value(default)
            ),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        });

        Ok(format!(
            "ALTER TABLE {} {}",
            self.qualified(expr.schema.as_deref(), &expr.table)?,
            actions.join(", ")
        ))
    }

    fn create_index_sql(&self, index: &IndexDefinition) -> Result<String> {
        if index.clustered {
            self.require(self.config.features.clustered_indexes, "clustered indexes")?;
        }
        if index.concurrently {
            self.require(
                self.config.features.concurrent_indexes,
                "concurrent index creation",
            )?;
        }
        if index.condition.is_some() {
            self.require(self.config.features.partial_indexes, "partial indexes")?;
        }

        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if index.concurrently {
            sql.push_str("CONCURRENTLY ");
        }
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.qualified(index.schema.as_deref(), &index.table)?);
        sql.push_str(" (");

        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.direction {
                Direction::Ascending => self.quote_identifier(&c.name),
                Direction::Descending => format!("{} DESC", self.quote_identifier(&c.name)),
            })
            .collect();
        sql.push_str(&columns.join(", "));
        sql.push(')');

        if let Some(condition) = &index.condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }

        Ok(sql)
    }

    fn create_foreign_key_sql(&self, fk: &ForeignKeyDefinition) -> Result<String> {
        self.require(
            self.config.features.alter_foreign_keys,
            "adding foreign keys to existing tables",
        )?;

        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}",
            self.qualified(fk.schema.as_deref(), &fk.table)?,
            self.quote_identifier(&fk.name),
            self.column_list(&fk.columns),
            self.qualified(fk.references_schema.as_deref(), &fk.references_table)?,
            self.column_list(&fk.references_columns),
            Self::foreign_key_actions(fk.on_delete, fk.on_update)
        ))
    }

    fn create_constraint_sql(&self, constraint: &ConstraintDefinition) -> Result<String> {
        let table = self.qualified(constraint.schema.as_deref(), &constraint.table)?;
        let columns = self.column_list(&constraint.columns);
        let features = self.config.features;

        if features.alter_constraints {
            let kind = match constraint.kind {
                ConstraintKind::PrimaryKey => "PRIMARY KEY",
                ConstraintKind::Unique => "UNIQUE",
            };
            return Ok(format!(
                "ALTER TABLE {table} ADD CONSTRAINT {} {kind} ({columns})",
                self.quote_identifier(&constraint.name)
            ));
        }

        if constraint.kind == ConstraintKind::Unique && features.unique_constraints_as_indexes {
            return Ok(format!(
                "CREATE UNIQUE INDEX {} ON {table} ({columns})",
                self.quote_identifier(&constraint.name)
            ));
        }

        Err(self.unsupported("adding primary key constraints to existing tables"))
    }

    fn delete_constraint_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        kind: ConstraintKind,
    ) -> Result<String> {
        let features = self.config.features;
        if features.alter_constraints {
            return Ok(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(schema, table)?,
                self.quote_identifier(name)
            ));
        }
        if kind == ConstraintKind::Unique && features.unique_constraints_as_indexes {
            return Ok(format!("DROP INDEX {}", self.qualified(schema, name)?));
        }
        Err(self.unsupported("dropping primary key constraints"))
    }

    fn create_sequence_sql(&self, sequence: &SequenceDefinition) -> Result<String> {
        self.require(self.config.features.sequences, "sequences")?;

        let mut sql = format!(
            "CREATE SEQUENCE {}",
            self.qualified(sequence.schema.as_deref(), &sequence.name)?
        );
        if let Some(increment) = sequence.increment {
            sql.push_str(&format!(" INCREMENT BY {increment}"));
        }
        if let Some(min) = sequence.min_value {
            sql.push_str(&format!(" MINVALUE {min}"));
        }
        if let Some(max) = sequence.max_value {
            sql.push_str(&format!(" MAXVALUE {max}"));
        }
        if let Some(start) = sequence.start_with {
            sql.push_str(&format!(" START WITH {start}"));
        }
        if let Some(cache) = sequence.cache {
            sql.push_str(&format!(" CACHE {cache}"));
        }
        if sequence.cycle {
            sql.push_str(" CYCLE");
        }
        Ok(sql)
    }

    /// Renders `col = value` pairs joined by `separator`. NULL filters use IS NULL.
    fn assignments(&self, row: &DataRow, separator: &str, filter: bool) -> String {
        row.values
            .iter()
            .map(|(column, value)| {
                let column = self.quote_identifier(column);
                if filter && *value == SqlValue::Null {
                    format!("{column} IS NULL")
                } else {
                    format!("{column} = {}", self.render_value(value))
                }
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    fn update_sql(&self, expr: &UpdateDataExpression) -> Result<String> {
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.qualified(expr.schema.as_deref(), &expr.table)?,
            self.assignments(&expr.set, ", ", false)
        );
        if !expr.all_rows {
            sql.push_str(" WHERE ");
            sql.push_str(&self.assignments(&expr.filter, " AND ", true));
        }
        Ok(sql)
    }
}

impl Generator for SqlGenerator {
    fn dialect(&self) -> &str {
        self.config.name
    }

    fn render(&self, expression: &Expression) -> Result<String> {
        let features = self.config.features;
        match expression {
            Expression::CreateSchema(e) => {
                self.require(features.schemas, "schemas")?;
                Ok(format!("CREATE SCHEMA {}", self.quote_identifier(&e.name)))
            }

            Expression::DeleteSchema(e) => {
                self.require(features.schemas, "schemas")?;
                Ok(format!("DROP SCHEMA {}", self.quote_identifier(&e.name)))
            }

            Expression::CreateTable(e) => self.create_table_sql(e),

            Expression::RenameTable(e) => Ok(format!(
                "ALTER TABLE {} RENAME TO {}",
                self.qualified(e.schema.as_deref(), &e.old_name)?,
                self.quote_identifier(&e.new_name)
            )),

            Expression::DeleteTable(e) => {
                let mut sql = String::from("DROP TABLE ");
                if e.if_exists {
                    sql.push_str("IF EXISTS ");
                }
                sql.push_str(&self.qualified(e.schema.as_deref(), &e.name)?);
                Ok(sql)
            }

            Expression::CreateColumn(e) => Ok(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualified(e.schema.as_deref(), &e.table)?,
                self.column_definition(&e.column, true)?
            )),

            Expression::AlterColumn(e) => self.alter_column_sql(e),

            Expression::RenameColumn(e) => Ok(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.qualified(e.schema.as_deref(), &e.table)?,
                self.quote_identifier(&e.old_name),
                self.quote_identifier(&e.new_name)
            )),

            Expression::DeleteColumn(e) => {
                let table = self.qualified(e.schema.as_deref(), &e.table)?;
                Ok(e.columns
                    .iter()
                    .map(|c| {
                        format!("ALTER TABLE {table} DROP COLUMN {}", self.quote_identifier(c))
                    })
                    .collect::<Vec<_>>()
                    .join(STATEMENT_SEPARATOR))
            }

            Expression::CreateIndex(e) => self.create_index_sql(&e.index),

            Expression::DeleteIndex(e) => Ok(format!(
                "DROP INDEX {}",
                self.qualified(e.schema.as_deref(), &e.name)?
            )),

            Expression::CreateForeignKey(e) => self.create_foreign_key_sql(&e.foreign_key),

            Expression::DeleteForeignKey(e) => {
                self.require(features.alter_foreign_keys, "dropping foreign keys")?;
                Ok(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.qualified(e.schema.as_deref(), &e.table)?,
                    self.quote_identifier(&e.name)
                ))
            }

            Expression::CreateConstraint(e) => self.create_constraint_sql(&e.constraint),

            Expression::DeleteConstraint(e) => {
                self.delete_constraint_sql(e.schema.as_deref(), &e.table, &e.name, e.kind)
            }

            Expression::CreateSequence(e) => self.create_sequence_sql(&e.sequence),

            Expression::DeleteSequence(e) => {
                self.require(features.sequences, "sequences")?;
                Ok(format!(
                    "DROP SEQUENCE {}",
                    self.qualified(e.schema.as_deref(), &e.name)?
                ))
            }

            Expression::InsertData(e) => {
                let table = self.qualified(e.schema.as_deref(), &e.table)?;
                Ok(e.rows
                    .iter()
                    .map(|row| {
                        let columns: Vec<&str> =
                            row.values.iter().map(|(c, _)| c.as_str()).collect();
                        let values: Vec<String> = row
                            .values
                            .iter()
                            .map(|(_, v)| self.render_value(v))
                            .collect();
                        format!(
                            "INSERT INTO {table} ({}) VALUES ({})",
                            self.column_list(&columns),
                            values.join(", ")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(STATEMENT_SEPARATOR))
            }

            Expression::UpdateData(e) => self.update_sql(e),

            Expression::DeleteData(e) => {
                let table = self.qualified(e.schema.as_deref(), &e.table)?;
                if e.all_rows {
                    return Ok(format!("DELETE FROM {table}"));
                }
                Ok(e.rows
                    .iter()
                    .map(|row| {
                        format!(
                            "DELETE FROM {table} WHERE {}",
                            self.assignments(row, " AND ", true)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(STATEMENT_SEPARATOR))
            }

            Expression::ExecuteSql(e) => Ok(e.sql.clone()),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        if !self.needs_quotes(name) {
            return name.to_string();
        }
        let close = self.config.quote_close;
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{}{escaped}{close}", self.config.quote_open)
    }

    fn supports_schemas(&self) -> bool {
        self.config.features.schemas
    }

    fn render_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => self.config.true_literal.to_string(),
            SqlValue::Bool(false) => self.config.false_literal.to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Expression(e) => e.clone(),
        }
    }
}

//! Schema definition types.
//!
//! These value objects describe columns, indexes, constraints and sequences.
//! Expressions own them, and generators clone them when a dialect needs to
//! adjust a definition before rendering.

use serde::{Deserialize, Serialize};

/// SQL data types supported by the migration system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Small integer (16-bit).
    SmallInt,
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON data.
    Json,
    /// UUID.
    Uuid,
    /// A type name passed through to the database unchanged.
    Custom(String),
}

impl SqlType {
    /// Returns true for the integer family.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }
}

/// A literal value used for column defaults and data expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// NULL.
    Null,
    /// Boolean, rendered with the dialect's literals.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// String, rendered quoted and escaped.
    String(String),
    /// SQL expression rendered verbatim (e.g., `CURRENT_TIMESTAMP`).
    Expression(String),
}

impl SqlValue {
    /// Appends an error if the value has no SQL literal form (NaN or infinity).
    pub fn validate(&self, context: &str, errors: &mut Vec<String>) {
        if let Self::Float(f) = self {
            if !f.is_finite() {
                errors.push(format!("{context} is not a finite number ({f})"));
            }
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Inline reference from a column to another table's column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Referenced schema.
    pub schema: Option<String>,
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Action on delete.
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    pub on_update: Option<ForeignKeyAction>,
}

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// SQL data type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value.
    pub default: Option<SqlValue>,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Whether the database generates values for this column.
    pub identity: bool,
    /// Whether this column has a UNIQUE constraint.
    pub unique: bool,
    /// Check constraint expression (if any).
    pub check: Option<String>,
    /// Inline foreign key reference.
    pub references: Option<ColumnReference>,
}

impl ColumnDefinition {
    /// Creates a new nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
            identity: false,
            unique: false,
            check: None,
            references: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Marks the column as database-generated.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a check constraint.
    #[must_use]
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Adds an inline reference to `table(column)`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ColumnReference {
            schema: None,
            table: table.into(),
            column: column.into(),
            on_delete: None,
            on_update: None,
        });
        self
    }

    /// Sets the ON DELETE action of the inline reference.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Some(reference) = self.references.as_mut() {
            reference.on_delete = Some(action);
        }
        self
    }

    /// Validates the definition, appending messages to `errors`.
    pub fn validate(&self, errors: &mut Vec<String>) {
        if self.name.trim().is_empty() {
            errors.push("Column name cannot be empty".to_string());
        }
        if let SqlType::Custom(name) = &self.sql_type {
            if name.trim().is_empty() {
                errors.push(format!("Column '{}' has an empty custom type", self.name));
            }
        }
        if let Some(default) = &self.default {
            default.validate(&format!("Default of column '{}'", self.name), errors);
        }
        if self.identity && !self.sql_type.is_integer() {
            errors.push(format!(
                "Identity column '{}' must have an integer type",
                self.name
            ));
        }
        if let Some(reference) = &self.references {
            if reference.table.trim().is_empty() || reference.column.trim().is_empty() {
                errors.push(format!(
                    "Column '{}' references an empty table or column",
                    self.name
                ));
            }
        }
    }
}

/// Sort direction of an indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    /// Ascending (the default).
    #[default]
    Ascending,
    /// Descending.
    Descending,
}

/// A column participating in an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Column name.
    pub name: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Schema of the indexed table.
    pub schema: Option<String>,
    /// Indexed table.
    pub table: String,
    /// Columns included in the index.
    pub columns: Vec<IndexColumn>,
    /// Whether this is a unique index.
    pub unique: bool,
    /// Whether the index should be clustered.
    pub clustered: bool,
    /// Whether to build the index without blocking writes.
    pub concurrently: bool,
    /// Partial index condition (WHERE clause).
    pub condition: Option<String>,
}

impl IndexDefinition {
    /// Creates a new index on `table`.
    #[must_use]
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table: table.into(),
            columns: Vec::new(),
            unique: false,
            clustered: false,
            concurrently: false,
            condition: None,
        }
    }

    /// Sets the schema of the indexed table.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds an ascending column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(IndexColumn {
            name: name.into(),
            direction: Direction::Ascending,
        });
        self
    }

    /// Adds a descending column.
    #[must_use]
    pub fn column_desc(mut self, name: impl Into<String>) -> Self {
        self.columns.push(IndexColumn {
            name: name.into(),
            direction: Direction::Descending,
        });
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Requests a clustered index.
    #[must_use]
    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }

    /// Requests a non-blocking build.
    #[must_use]
    pub fn concurrently(mut self) -> Self {
        self.concurrently = true;
        self
    }

    /// Sets a partial index condition.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Definition of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    /// Constraint name.
    pub name: String,
    /// Schema of the referencing table.
    pub schema: Option<String>,
    /// Referencing table.
    pub table: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Schema of the referenced table.
    pub references_schema: Option<String>,
    /// Referenced table name.
    pub references_table: String,
    /// Referenced column(s).
    pub references_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDefinition {
    /// Creates a new foreign key named `name` on `table`.
    #[must_use]
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table: table.into(),
            columns: Vec::new(),
            references_schema: None,
            references_table: String::new(),
            references_columns: Vec::new(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets the schema of the referencing table.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the local columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the referenced table and columns.
    #[must_use]
    pub fn references<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references_table = table.into();
        self.references_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the schema of the referenced table.
    #[must_use]
    pub fn references_schema(mut self, schema: impl Into<String>) -> Self {
        self.references_schema = Some(schema.into());
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Kind of table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// PRIMARY KEY constraint.
    PrimaryKey,
    /// UNIQUE constraint.
    Unique,
}

/// Definition of a named table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    /// Constraint name.
    pub name: String,
    /// Schema of the constrained table.
    pub schema: Option<String>,
    /// Constrained table.
    pub table: String,
    /// Constraint kind.
    pub kind: ConstraintKind,
    /// Columns that form the constraint.
    pub columns: Vec<String>,
}

impl ConstraintDefinition {
    /// Creates a UNIQUE constraint.
    #[must_use]
    pub fn unique(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(name, table, ConstraintKind::Unique)
    }

    /// Creates a PRIMARY KEY constraint.
    #[must_use]
    pub fn primary_key(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(name, table, ConstraintKind::PrimaryKey)
    }

    fn new(name: impl Into<String>, table: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table: table.into(),
            kind,
            columns: Vec::new(),
        }
    }

    /// Sets the schema of the constrained table.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a column to the constraint.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }
}

/// Definition of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceDefinition {
    /// Sequence name.
    pub name: String,
    /// Schema of the sequence.
    pub schema: Option<String>,
    /// First value.
    pub start_with: Option<i64>,
    /// Step between values.
    pub increment: Option<i64>,
    /// Lower bound.
    pub min_value: Option<i64>,
    /// Upper bound.
    pub max_value: Option<i64>,
    /// Number of values to preallocate.
    pub cache: Option<i64>,
    /// Whether the sequence wraps around.
    pub cycle: bool,
}

impl SequenceDefinition {
    /// Creates a sequence with database defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            start_with: None,
            increment: None,
            min_value: None,
            max_value: None,
            cache: None,
            cycle: false,
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the first value.
    #[must_use]
    pub fn start_with(mut self, value: i64) -> Self {
        self.start_with = Some(value);
        self
    }

    /// Sets the increment.
    #[must_use]
    pub fn increment_by(mut self, value: i64) -> Self {
        self.increment = Some(value);
        self
    }

    /// Sets the bounds.
    #[must_use]
    pub fn bounds(mut self, min: i64, max: i64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Sets the cache size.
    #[must_use]
    pub fn cache(mut self, size: i64) -> Self {
        self.cache = Some(size);
        self
    }

    /// Makes the sequence wrap around.
    #[must_use]
    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }
}

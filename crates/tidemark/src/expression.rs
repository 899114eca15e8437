//! Migration expressions.
//!
//! Each expression is one schema-change intent. A migration's `up` or `down`
//! produces an ordered list of them; the runner validates the whole list,
//! then renders and executes them in order.

use serde::{Deserialize, Serialize};

use crate::schema::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, ForeignKeyDefinition,
    IndexDefinition, SequenceDefinition, SqlValue,
};

fn require(errors: &mut Vec<String>, value: &str, what: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{what} cannot be empty"));
    }
}

fn validate_values(errors: &mut Vec<String>, table: &str, row: &DataRow) {
    for (column, value) in &row.values {
        value.validate(&format!("Value for '{table}.{column}'"), errors);
    }
}

fn qualified(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{schema}.{name}"),
        None => name.to_string(),
    }
}

/// Creates a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSchemaExpression {
    /// Schema name.
    pub name: String,
}

/// Drops a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSchemaExpression {
    /// Schema name.
    pub name: String,
}

/// Creates a table with its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Column definitions, in table order.
    pub columns: Vec<ColumnDefinition>,
}

impl CreateTableExpression {
    /// Creates an expression for a table without columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the names of the primary key columns.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Renames a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameTableExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Current table name.
    pub old_name: String,
    /// New table name.
    pub new_name: String,
}

/// Drops a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTableExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Whether to use IF EXISTS.
    pub if_exists: bool,
}

/// Adds a column to an existing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateColumnExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Column definition.
    pub column: ColumnDefinition,
}

/// Changes a column to a new definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterColumnExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// The column's new definition.
    pub column: ColumnDefinition,
    /// The column's definition before the change, when known.
    pub previous: Option<ColumnDefinition>,
}

/// Renames a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameColumnExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Current column name.
    pub old_name: String,
    /// New column name.
    pub new_name: String,
}

/// Drops one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteColumnExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Column names.
    pub columns: Vec<String>,
}

/// Creates an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexExpression {
    /// Index definition.
    pub index: IndexDefinition,
}

/// Drops an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteIndexExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table the index belongs to.
    pub table: String,
    /// Index name.
    pub name: String,
}

/// Adds a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateForeignKeyExpression {
    /// Foreign key definition.
    pub foreign_key: ForeignKeyDefinition,
}

/// Drops a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteForeignKeyExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Referencing table.
    pub table: String,
    /// Constraint name.
    pub name: String,
}

/// Adds a PRIMARY KEY or UNIQUE constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateConstraintExpression {
    /// Constraint definition.
    pub constraint: ConstraintDefinition,
}

/// Drops a PRIMARY KEY or UNIQUE constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteConstraintExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Constrained table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Constraint kind.
    pub kind: ConstraintKind,
}

/// Creates a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSequenceExpression {
    /// Sequence definition.
    pub sequence: SequenceDefinition,
}

/// Drops a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSequenceExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Sequence name.
    pub name: String,
}

/// An ordered list of column/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    /// Column/value pairs in insertion order.
    pub values: Vec<(String, SqlValue)>,
}

impl DataRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Returns true if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Inserts rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertDataExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Rows to insert.
    pub rows: Vec<DataRow>,
}

impl InsertDataExpression {
    /// Creates an insert into `table` without rows.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            rows: Vec::new(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn in_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Appends a row.
    #[must_use]
    pub fn row(mut self, row: DataRow) -> Self {
        self.rows.push(row);
        self
    }
}

/// Updates rows matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDataExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// New values.
    pub set: DataRow,
    /// Equality filter; ignored when `all_rows` is set.
    pub filter: DataRow,
    /// Update every row.
    pub all_rows: bool,
}

/// Deletes rows matching filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDataExpression {
    /// Schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Each row is an equality filter; one statement per row.
    pub rows: Vec<DataRow>,
    /// Delete every row.
    pub all_rows: bool,
}

impl DeleteDataExpression {
    /// Creates a delete from `table` without filters.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            rows: Vec::new(),
            all_rows: false,
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn in_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Appends a row filter.
    #[must_use]
    pub fn row(mut self, row: DataRow) -> Self {
        self.rows.push(row);
        self
    }
}

/// Runs raw SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteSqlExpression {
    /// SQL to run.
    pub sql: String,
    /// SQL that undoes `sql`, used for automatic reversal.
    pub reverse_sql: Option<String>,
}

/// A single schema-change intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Create a schema.
    CreateSchema(CreateSchemaExpression),
    /// Drop a schema.
    DeleteSchema(DeleteSchemaExpression),
    /// Create a table.
    CreateTable(CreateTableExpression),
    /// Rename a table.
    RenameTable(RenameTableExpression),
    /// Drop a table.
    DeleteTable(DeleteTableExpression),
    /// Add a column.
    CreateColumn(CreateColumnExpression),
    /// Alter a column.
    AlterColumn(AlterColumnExpression),
    /// Rename a column.
    RenameColumn(RenameColumnExpression),
    /// Drop columns.
    DeleteColumn(DeleteColumnExpression),
    /// Create an index.
    CreateIndex(CreateIndexExpression),
    /// Drop an index.
    DeleteIndex(DeleteIndexExpression),
    /// Add a foreign key.
    CreateForeignKey(CreateForeignKeyExpression),
    /// Drop a foreign key.
    DeleteForeignKey(DeleteForeignKeyExpression),
    /// Add a constraint.
    CreateConstraint(CreateConstraintExpression),
    /// Drop a constraint.
    DeleteConstraint(DeleteConstraintExpression),
    /// Create a sequence.
    CreateSequence(CreateSequenceExpression),
    /// Drop a sequence.
    DeleteSequence(DeleteSequenceExpression),
    /// Insert rows.
    InsertData(InsertDataExpression),
    /// Update rows.
    UpdateData(UpdateDataExpression),
    /// Delete rows.
    DeleteData(DeleteDataExpression),
    /// Run raw SQL.
    ExecuteSql(ExecuteSqlExpression),
}

macro_rules! impl_from_expression {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expression {
                fn from(expression: $ty) -> Self {
                    Self::$variant(expression)
                }
            }
        )*
    };
}

impl_from_expression! {
    CreateSchema => CreateSchemaExpression,
    DeleteSchema => DeleteSchemaExpression,
    CreateTable => CreateTableExpression,
    RenameTable => RenameTableExpression,
    DeleteTable => DeleteTableExpression,
    CreateColumn => CreateColumnExpression,
    AlterColumn => AlterColumnExpression,
    RenameColumn => RenameColumnExpression,
    DeleteColumn => DeleteColumnExpression,
    CreateIndex => CreateIndexExpression,
    DeleteIndex => DeleteIndexExpression,
    CreateForeignKey => CreateForeignKeyExpression,
    DeleteForeignKey => DeleteForeignKeyExpression,
    CreateConstraint => CreateConstraintExpression,
    DeleteConstraint => DeleteConstraintExpression,
    CreateSequence => CreateSequenceExpression,
    DeleteSequence => DeleteSequenceExpression,
    InsertData => InsertDataExpression,
    UpdateData => UpdateDataExpression,
    DeleteData => DeleteDataExpression,
    ExecuteSql => ExecuteSqlExpression,
}

impl Expression {
    // Convenience constructors

    /// Creates a CreateSchema expression.
    #[must_use]
    pub fn create_schema(name: impl Into<String>) -> Self {
        Self::CreateSchema(CreateSchemaExpression { name: name.into() })
    }

    /// Creates a DeleteSchema expression.
    #[must_use]
    pub fn delete_schema(name: impl Into<String>) -> Self {
        Self::DeleteSchema(DeleteSchemaExpression { name: name.into() })
    }

    /// Creates a DeleteTable expression.
    #[must_use]
    pub fn delete_table(name: impl Into<String>) -> Self {
        Self::DeleteTable(DeleteTableExpression {
            schema: None,
            name: name.into(),
            if_exists: false,
        })
    }

    /// Creates a RenameTable expression.
    #[must_use]
    pub fn rename_table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::RenameTable(RenameTableExpression {
            schema: None,
            old_name: old_name.into(),
            new_name: new_name.into(),
        })
    }

    /// Creates a CreateColumn expression.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnDefinition) -> Self {
        Self::CreateColumn(CreateColumnExpression {
            schema: None,
            table: table.into(),
            column,
        })
    }

    /// Creates an AlterColumn expression without a recorded previous definition.
    #[must_use]
    pub fn alter_column(table: impl Into<String>, column: ColumnDefinition) -> Self {
        Self::AlterColumn(AlterColumnExpression {
            schema: None,
            table: table.into(),
            column,
            previous: None,
        })
    }

    /// Creates a RenameColumn expression.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::RenameColumn(RenameColumnExpression {
            schema: None,
            table: table.into(),
            old_name: old_name.into(),
            new_name: new_name.into(),
        })
    }

    /// Creates a DeleteColumn expression for one column.
    #[must_use]
    pub fn delete_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DeleteColumn(DeleteColumnExpression {
            schema: None,
            table: table.into(),
            columns: vec![column.into()],
        })
    }

    /// Creates a CreateIndex expression.
    #[must_use]
    pub fn create_index(index: IndexDefinition) -> Self {
        Self::CreateIndex(CreateIndexExpression { index })
    }

    /// Creates a DeleteIndex expression.
    #[must_use]
    pub fn delete_index(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DeleteIndex(DeleteIndexExpression {
            schema: None,
            table: table.into(),
            name: name.into(),
        })
    }

    /// Creates a CreateForeignKey expression.
    #[must_use]
    pub fn create_foreign_key(foreign_key: ForeignKeyDefinition) -> Self {
        Self::CreateForeignKey(CreateForeignKeyExpression { foreign_key })
    }

    /// Creates a CreateConstraint expression.
    #[must_use]
    pub fn create_constraint(constraint: ConstraintDefinition) -> Self {
        Self::CreateConstraint(CreateConstraintExpression { constraint })
    }

    /// Creates a CreateSequence expression.
    #[must_use]
    pub fn create_sequence(sequence: SequenceDefinition) -> Self {
        Self::CreateSequence(CreateSequenceExpression { sequence })
    }

    /// Creates an ExecuteSql expression.
    #[must_use]
    pub fn execute_sql(sql: impl Into<String>, reverse_sql: Option<String>) -> Self {
        Self::ExecuteSql(ExecuteSqlExpression {
            sql: sql.into(),
            reverse_sql,
        })
    }

    /// Validates the expression and returns every problem found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::CreateSchema(e) => require(&mut errors, &e.name, "Schema name"),
            Self::DeleteSchema(e) => require(&mut errors, &e.name, "Schema name"),
            Self::CreateTable(e) => {
                require(&mut errors, &e.name, "Table name");
                if e.columns.is_empty() {
                    errors.push(format!("Table '{}' must define at least one column", e.name));
                }
                for (i, column) in e.columns.iter().enumerate() {
                    column.validate(&mut errors);
                    if e.columns[..i].iter().any(|c| c.name == column.name) {
                        errors.push(format!(
                            "Column '{}' is defined more than once in table '{}'",
                            column.name, e.name
                        ));
                    }
                }
            }
            Self::RenameTable(e) => {
                require(&mut errors, &e.old_name, "Old table name");
                require(&mut errors, &e.new_name, "New table name");
            }
            Self::DeleteTable(e) => require(&mut errors, &e.name, "Table name"),
            Self::CreateColumn(e) => {
                require(&mut errors, &e.table, "Table name");
                e.column.validate(&mut errors);
            }
            Self::AlterColumn(e) => {
                require(&mut errors, &e.table, "Table name");
                e.column.validate(&mut errors);
            }
            Self::RenameColumn(e) => {
                require(&mut errors, &e.table, "Table name");
                require(&mut errors, &e.old_name, "Old column name");
                require(&mut errors, &e.new_name, "New column name");
            }
            Self::DeleteColumn(e) => {
                require(&mut errors, &e.table, "Table name");
                if e.columns.is_empty() {
                    errors.push("At least one column must be deleted".to_string());
                }
                for column in &e.columns {
                    require(&mut errors, column, "Column name");
                }
            }
            Self::CreateIndex(e) => {
                require(&mut errors, &e.index.name, "Index name");
                require(&mut errors, &e.index.table, "Table name");
                if e.index.columns.is_empty() {
                    errors.push(format!(
                        "Index '{}' must include at least one column",
                        e.index.name
                    ));
                }
            }
            Self::DeleteIndex(e) => require(&mut errors, &e.name, "Index name"),
            Self::CreateForeignKey(e) => {
                let fk = &e.foreign_key;
                require(&mut errors, &fk.name, "Foreign key name");
                require(&mut errors, &fk.table, "Foreign table name");
                require(&mut errors, &fk.references_table, "Primary table name");
                if fk.columns.is_empty() {
                    errors.push(format!(
                        "Foreign key '{}' must include at least one column",
                        fk.name
                    ));
                }
                if fk.columns.len() != fk.references_columns.len() {
                    errors.push(format!(
                        "Foreign key '{}' has {} column(s) but references {}",
                        fk.name,
                        fk.columns.len(),
                        fk.references_columns.len()
                    ));
                }
            }
            Self::DeleteForeignKey(e) => {
                require(&mut errors, &e.table, "Table name");
                require(&mut errors, &e.name, "Foreign key name");
            }
            Self::CreateConstraint(e) => {
                require(&mut errors, &e.constraint.name, "Constraint name");
                require(&mut errors, &e.constraint.table, "Table name");
                if e.constraint.columns.is_empty() {
                    errors.push(format!(
                        "Constraint '{}' must include at least one column",
                        e.constraint.name
                    ));
                }
            }
            Self::DeleteConstraint(e) => {
                require(&mut errors, &e.table, "Table name");
                require(&mut errors, &e.name, "Constraint name");
            }
            Self::CreateSequence(e) => {
                require(&mut errors, &e.sequence.name, "Sequence name");
                if e.sequence.increment == Some(0) {
                    errors.push(format!(
                        "Sequence '{}' cannot have an increment of zero",
                        e.sequence.name
                    ));
                }
                if let (Some(min), Some(max)) = (e.sequence.min_value, e.sequence.max_value) {
                    if min > max {
                        errors.push(format!(
                            "Sequence '{}' has a minimum greater than its maximum",
                            e.sequence.name
                        ));
                    }
                }
            }
            Self::DeleteSequence(e) => require(&mut errors, &e.name, "Sequence name"),
            Self::InsertData(e) => {
                require(&mut errors, &e.table, "Table name");
                if e.rows.is_empty() {
                    errors.push(format!("Insert into '{}' has no rows", e.table));
                }
                if e.rows.iter().any(DataRow::is_empty) {
                    errors.push(format!("Insert into '{}' has an empty row", e.table));
                }
                for row in &e.rows {
                    validate_values(&mut errors, &e.table, row);
                }
            }
            Self::UpdateData(e) => {
                require(&mut errors, &e.table, "Table name");
                if e.set.is_empty() {
                    errors.push(format!("Update of '{}' sets no columns", e.table));
                }
                if !e.all_rows && e.filter.is_empty() {
                    errors.push(format!(
                        "Update of '{}' needs a filter or must target all rows",
                        e.table
                    ));
                }
                validate_values(&mut errors, &e.table, &e.set);
                validate_values(&mut errors, &e.table, &e.filter);
            }
            Self::DeleteData(e) => {
                require(&mut errors, &e.table, "Table name");
                if !e.all_rows && (e.rows.is_empty() || e.rows.iter().any(DataRow::is_empty)) {
                    errors.push(format!(
                        "Delete from '{}' needs row filters or must target all rows",
                        e.table
                    ));
                }
                for row in &e.rows {
                    validate_values(&mut errors, &e.table, row);
                }
            }
            Self::ExecuteSql(e) => require(&mut errors, &e.sql, "SQL statement"),
        }
        errors
    }

    /// Returns the expression that undoes this one.
    ///
    /// Returns `None` if the expression cannot be reversed without
    /// information it does not carry.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateSchema(e) => Some(Self::delete_schema(e.name.clone())),

            Self::CreateTable(e) => Some(Self::DeleteTable(DeleteTableExpression {
                schema: e.schema.clone(),
                name: e.name.clone(),
                if_exists: false,
            })),

            Self::RenameTable(e) => Some(Self::RenameTable(RenameTableExpression {
                schema: e.schema.clone(),
                old_name: e.new_name.clone(),
                new_name: e.old_name.clone(),
            })),

            Self::CreateColumn(e) => Some(Self::DeleteColumn(DeleteColumnExpression {
                schema: e.schema.clone(),
                table: e.table.clone(),
                columns: vec![e.column.name.clone()],
            })),

            // Can only reverse if the previous definition was recorded
            Self::AlterColumn(e) => e.previous.as_ref().map(|previous| {
                Self::AlterColumn(AlterColumnExpression {
                    schema: e.schema.clone(),
                    table: e.table.clone(),
                    column: previous.clone(),
                    previous: Some(e.column.clone()),
                })
            }),

            Self::RenameColumn(e) => Some(Self::RenameColumn(RenameColumnExpression {
                schema: e.schema.clone(),
                table: e.table.clone(),
                old_name: e.new_name.clone(),
                new_name: e.old_name.clone(),
            })),

            Self::CreateIndex(e) => Some(Self::DeleteIndex(DeleteIndexExpression {
                schema: e.index.schema.clone(),
                table: e.index.table.clone(),
                name: e.index.name.clone(),
            })),

            Self::CreateForeignKey(e) => Some(Self::DeleteForeignKey(DeleteForeignKeyExpression {
                schema: e.foreign_key.schema.clone(),
                table: e.foreign_key.table.clone(),
                name: e.foreign_key.name.clone(),
            })),

            Self::CreateConstraint(e) => {
                Some(Self::DeleteConstraint(DeleteConstraintExpression {
                    schema: e.constraint.schema.clone(),
                    table: e.constraint.table.clone(),
                    name: e.constraint.name.clone(),
                    kind: e.constraint.kind,
                }))
            }

            Self::CreateSequence(e) => Some(Self::DeleteSequence(DeleteSequenceExpression {
                schema: e.sequence.schema.clone(),
                name: e.sequence.name.clone(),
            })),

            Self::InsertData(e) => Some(Self::DeleteData(DeleteDataExpression {
                schema: e.schema.clone(),
                table: e.table.clone(),
                rows: e.rows.clone(),
                all_rows: false,
            })),

            Self::ExecuteSql(e) => e.reverse_sql.as_ref().map(|reverse| {
                Self::ExecuteSql(ExecuteSqlExpression {
                    sql: reverse.clone(),
                    reverse_sql: Some(e.sql.clone()),
                })
            }),

            Self::DeleteSchema(_)
            | Self::DeleteTable(_)
            | Self::DeleteColumn(_)
            | Self::DeleteIndex(_)
            | Self::DeleteForeignKey(_)
            | Self::DeleteConstraint(_)
            | Self::DeleteSequence(_)
            | Self::UpdateData(_)
            | Self::DeleteData(_) => None,
        }
    }

    /// Returns true if this expression can be reversed.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.reverse().is_some()
    }

    /// Returns a human-readable description of this expression.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateSchema(e) => format!("Create schema '{}'", e.name),
            Self::DeleteSchema(e) => format!("Delete schema '{}'", e.name),
            Self::CreateTable(e) => {
                format!("Create table '{}'", qualified(e.schema.as_deref(), &e.name))
            }
            Self::RenameTable(e) => format!(
                "Rename table '{}' to '{}'",
                qualified(e.schema.as_deref(), &e.old_name),
                e.new_name
            ),
            Self::DeleteTable(e) => {
                format!("Delete table '{}'", qualified(e.schema.as_deref(), &e.name))
            }
            Self::CreateColumn(e) => format!(
                "Create column '{}' on table '{}'",
                e.column.name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::AlterColumn(e) => format!(
                "Alter column '{}' on table '{}'",
                e.column.name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::RenameColumn(e) => format!(
                "Rename column '{}' to '{}' on table '{}'",
                e.old_name,
                e.new_name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::DeleteColumn(e) => format!(
                "Delete column(s) '{}' from table '{}'",
                e.columns.join("', '"),
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::CreateIndex(e) => format!(
                "Create index '{}' on table '{}'",
                e.index.name,
                qualified(e.index.schema.as_deref(), &e.index.table)
            ),
            Self::DeleteIndex(e) => format!(
                "Delete index '{}' on table '{}'",
                e.name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::CreateForeignKey(e) => format!(
                "Create foreign key '{}' on table '{}'",
                e.foreign_key.name,
                qualified(e.foreign_key.schema.as_deref(), &e.foreign_key.table)
            ),
            Self::DeleteForeignKey(e) => format!(
                "Delete foreign key '{}' on table '{}'",
                e.name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::CreateConstraint(e) => format!(
                "Create constraint '{}' on table '{}'",
                e.constraint.name,
                qualified(e.constraint.schema.as_deref(), &e.constraint.table)
            ),
            Self::DeleteConstraint(e) => format!(
                "Delete constraint '{}' on table '{}'",
                e.name,
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::CreateSequence(e) => format!(
                "Create sequence '{}'",
                qualified(e.sequence.schema.as_deref(), &e.sequence.name)
            ),
            Self::DeleteSequence(e) => {
                format!("Delete sequence '{}'", qualified(e.schema.as_deref(), &e.name))
            }
            Self::InsertData(e) => format!(
                "Insert {} row(s) into '{}'",
                e.rows.len(),
                qualified(e.schema.as_deref(), &e.table)
            ),
            Self::UpdateData(e) => {
                format!("Update data in '{}'", qualified(e.schema.as_deref(), &e.table))
            }
            Self::DeleteData(e) => {
                format!("Delete data from '{}'", qualified(e.schema.as_deref(), &e.table))
            }
            Self::ExecuteSql(_) => "Execute custom SQL".to_string(),
        }
    }
}

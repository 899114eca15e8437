//! PostgreSQL dialect configuration.

use crate::schema::SqlType;

use super::{DialectConfig, DialectFeatures, IdentityStyle};

const RESERVED_WORDS: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH", "CASE",
    "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_DATE", "CURRENT_ROLE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "DEFAULT", "DEFERRABLE", "DESC",
    "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE", "FETCH", "FOR", "FOREIGN", "FROM", "GRANT",
    "GROUP", "HAVING", "IN", "INITIALLY", "INTERSECT", "INTO", "LATERAL", "LEADING", "LIMIT",
    "LOCALTIME", "LOCALTIMESTAMP", "NOT", "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "PLACING",
    "PRIMARY", "REFERENCES", "RETURNING", "SELECT", "SESSION_USER", "SOME", "SYMMETRIC", "TABLE",
    "THEN", "TO", "TRAILING", "TRUE", "UNION", "UNIQUE", "USER", "USING", "VARIADIC", "WHEN",
    "WHERE", "WINDOW", "WITH",
];

/// Maps abstract types onto PostgreSQL types.
#[must_use]
pub fn postgres_type_name(sql_type: &SqlType) -> String {
    match sql_type {
        SqlType::SmallInt => "SMALLINT".to_string(),
        SqlType::Integer => "INTEGER".to_string(),
        SqlType::BigInt => "BIGINT".to_string(),
        SqlType::Text => "TEXT".to_string(),
        SqlType::Varchar(len) => format!("VARCHAR({len})"),
        SqlType::Char(len) => format!("CHAR({len})"),
        SqlType::Boolean => "BOOLEAN".to_string(),
        SqlType::DateTime | SqlType::Timestamp => "TIMESTAMP".to_string(),
        SqlType::Date => "DATE".to_string(),
        SqlType::Time => "TIME".to_string(),
        SqlType::Real => "REAL".to_string(),
        SqlType::Double => "DOUBLE PRECISION".to_string(),
        SqlType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
        SqlType::Blob => "BYTEA".to_string(),
        SqlType::Json => "JSONB".to_string(),
        SqlType::Uuid => "UUID".to_string(),
        SqlType::Custom(name) => name.clone(),
    }
}

/// Returns the PostgreSQL dialect configuration.
#[must_use]
pub fn postgres_config() -> DialectConfig {
    DialectConfig {
        name: "postgres",
        quote_open: '"',
        quote_close: '"',
        quote_all: true,
        reserved_words: RESERVED_WORDS,
        type_map: postgres_type_name,
        identity: IdentityStyle::GeneratedByDefault,
        true_literal: "TRUE",
        false_literal: "FALSE",
        features: DialectFeatures {
            schemas: true,
            sequences: true,
            alter_column: true,
            alter_foreign_keys: true,
            alter_constraints: true,
            unique_constraints_as_indexes: false,
            clustered_indexes: false,
            concurrent_indexes: true,
            partial_indexes: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{AlterColumnExpression, CreateTableExpression, Expression};
    use crate::generator::{Generator, SqlGenerator};
    use crate::schema::{
        ColumnDefinition, ConstraintDefinition, ForeignKeyAction, ForeignKeyDefinition,
        IndexDefinition, SequenceDefinition,
    };

    fn render(expression: impl Into<Expression>) -> String {
        SqlGenerator::postgres().render(&expression.into()).unwrap()
    }

    #[test]
    fn test_identity_column() {
        let sql = render(
            CreateTableExpression::new("users")
                .in_schema("app")
                .column(
                    ColumnDefinition::new("id", SqlType::BigInt)
                        .primary_key()
                        .identity(),
                ),
        );
        assert!(sql.starts_with("CREATE TABLE \"app\".\"users\""));
        assert!(sql.contains("\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"));
    }

    #[test]
    fn test_alter_column() {
        let sql = render(AlterColumnExpression {
            schema: None,
            table: "users".to_string(),
            column: ColumnDefinition::new("name", SqlType::Varchar(100))
                .not_null()
                .default("anonymous"),
            previous: None,
        });
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"name\" TYPE VARCHAR(100), \
             ALTER COLUMN \"name\" SET NOT NULL, \
             ALTER COLUMN \"name\" SET DEFAULT 'anonymous'"
        );
    }

    #[test]
    fn test_foreign_key() {
        let sql = render(Expression::create_foreign_key(
            ForeignKeyDefinition::new("fk_notes_context", "notes")
                .columns(["context_id"])
                .references("contexts", ["id"])
                .on_delete(ForeignKeyAction::Cascade),
        ));
        assert_eq!(
            sql,
            "ALTER TABLE \"notes\" ADD CONSTRAINT \"fk_notes_context\" FOREIGN KEY \
             (\"context_id\") REFERENCES \"contexts\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_constraints() {
        let sql = render(Expression::create_constraint(
            ConstraintDefinition::primary_key("pk_users", "users").column("id"),
        ));
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ADD CONSTRAINT \"pk_users\" PRIMARY KEY (\"id\")"
        );
    }

    #[test]
    fn test_concurrent_index() {
        let sql = render(Expression::create_index(
            IndexDefinition::new("ix_users_email", "users")
                .column("email")
                .concurrently(),
        ));
        assert_eq!(
            sql,
            "CREATE INDEX CONCURRENTLY \"ix_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_sequence() {
        let sql = render(Expression::create_sequence(
            SequenceDefinition::new("order_numbers")
                .in_schema("billing")
                .start_with(1000)
                .increment_by(1)
                .cycle(),
        ));
        assert_eq!(
            sql,
            "CREATE SEQUENCE \"billing\".\"order_numbers\" INCREMENT BY 1 START WITH 1000 CYCLE"
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(postgres_type_name(&SqlType::Blob), "BYTEA");
        assert_eq!(postgres_type_name(&SqlType::Double), "DOUBLE PRECISION");
        assert_eq!(postgres_type_name(&SqlType::Decimal(10, 2)), "DECIMAL(10, 2)");
    }
}

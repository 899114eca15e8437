//! SQLite dialect configuration.
//!
//! SQLite has limited ALTER TABLE support: columns cannot be altered and
//! constraints cannot be added after table creation. UNIQUE constraints are
//! expressed as unique indexes; everything else the engine cannot do fails
//! with an unsupported-feature error.

use crate::schema::SqlType;

use super::{DialectConfig, DialectFeatures, IdentityStyle};

const RESERVED_WORDS: &[&str] = &[
    "ABORT", "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK",
    "COLLATE", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FOREIGN", "FROM", "GROUP",
    "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "LEFT",
    "LIKE", "LIMIT", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES",
    "SELECT", "SET", "TABLE", "THEN", "TO", "TRANSACTION", "UNION", "UNIQUE", "UPDATE", "USING",
    "VALUES", "WHEN", "WHERE",
];

/// Maps abstract types onto SQLite's storage classes.
#[must_use]
pub fn sqlite_type_name(sql_type: &SqlType) -> String {
    match sql_type {
        // SQLite uses INTEGER for all ints; AUTOINCREMENT requires it
        SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => "INTEGER",
        SqlType::Text | SqlType::Varchar(_) | SqlType::Char(_) => "TEXT",
        SqlType::Boolean => "INTEGER", // stored as 0/1
        SqlType::DateTime | SqlType::Date | SqlType::Time | SqlType::Timestamp => "TEXT",
        SqlType::Real | SqlType::Double => "REAL",
        SqlType::Decimal(_, _) => "NUMERIC",
        SqlType::Blob => "BLOB",
        SqlType::Json | SqlType::Uuid => "TEXT",
        SqlType::Custom(name) => return name.clone(),
    }
    .to_string()
}

/// Returns the SQLite dialect configuration.
#[must_use]
pub fn sqlite_config() -> DialectConfig {
    DialectConfig {
        name: "sqlite",
        quote_open: '"',
        quote_close: '"',
        quote_all: true,
        reserved_words: RESERVED_WORDS,
        type_map: sqlite_type_name,
        identity: IdentityStyle::AutoIncrement,
        true_literal: "1",
        false_literal: "0",
        features: DialectFeatures {
            schemas: false,
            sequences: false,
            alter_column: false,
            alter_foreign_keys: false,
            alter_constraints: false,
            unique_constraints_as_indexes: true,
            clustered_indexes: false,
            concurrent_indexes: false,
            partial_indexes: true,
        },
    }
}

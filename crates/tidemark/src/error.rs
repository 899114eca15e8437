//! Error types for the migration system.

use std::fmt;

/// An unapplied migration whose version is lower than the latest applied one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    /// Version of the unapplied migration.
    pub version: i64,
    /// Description of the unapplied migration.
    pub description: String,
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.description)
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Two registered migrations share a version number.
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// The shared version.
        version: i64,
        /// Description of the first migration registered with this version.
        first: String,
        /// Description of the second migration registered with this version.
        second: String,
    },

    /// The loader filter matched no migrations.
    #[error("No migrations found matching {filter}")]
    NoMigrationsFound {
        /// Human-readable summary of the active filter.
        filter: String,
    },

    /// Unapplied migrations are older than the latest applied migration.
    #[error(
        "Unapplied migrations have a version lower than the latest applied version:\n{}",
        .violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n")
    )]
    VersionOrderInvalid {
        /// Every offending migration.
        violations: Vec<OrderViolation>,
    },

    /// One or more expressions of a migration failed self-validation.
    #[error(
        "Migration {version} ({description}) is invalid:\n{}",
        .errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n")
    )]
    Validation {
        /// Migration version.
        version: i64,
        /// Migration description.
        description: String,
        /// Validation messages.
        errors: Vec<String>,
    },

    /// A statement failed on the database.
    #[error("Failed to execute SQL: {detail}\n{sql}")]
    SqlExecution {
        /// The statement that failed.
        sql: String,
        /// Error text reported by the database driver.
        detail: String,
    },

    /// The dialect cannot express a requested capability.
    #[error("Dialect '{dialect}' does not support {feature}")]
    UnsupportedFeature {
        /// Dialect name.
        dialect: String,
        /// The missing capability.
        feature: String,
    },

    /// A migration failed while running.
    #[error("Migration {version} ({description}) failed at '{expression}': {source}")]
    MigrationExecution {
        /// Migration version.
        version: i64,
        /// Migration description.
        description: String,
        /// The expression (or step) that failed.
        expression: String,
        /// The underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// The ledger already holds this version.
    #[error("Version {0} is already recorded in the version table")]
    DuplicateApply(i64),

    /// No dialect is registered under this name.
    #[error("Unknown dialect '{0}'")]
    UnknownDialect(String),

    /// An applied version has no migration in the catalog.
    #[error("Migration {0} is applied but not present in the catalog")]
    MigrationNotFound(i64),

    /// An expression has no automatic reverse.
    #[error("Expression '{0}' cannot be reversed automatically")]
    NotReversible(String),

    /// Transaction calls were made out of order.
    #[error("Invalid transaction state: {0}")]
    TransactionState(String),

    /// Database error outside statement execution (connecting, committing).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Returns false for conditions that are reported but should not fail a run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoMigrationsFound { .. })
    }

    /// Returns the migration version this error is attributed to, if any.
    #[must_use]
    pub fn version(&self) -> Option<i64> {
        match self {
            Self::Validation { version, .. } | Self::MigrationExecution { version, .. } => {
                Some(*version)
            }
            Self::DuplicateApply(version) | Self::MigrationNotFound(version) => Some(*version),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

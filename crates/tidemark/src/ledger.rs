//! Version ledger.
//!
//! Records which migration versions are applied, in a table inside the
//! target database. The table is created on first use through the active
//! generator, so its DDL follows the dialect like any migration would.
//! Nothing is cached: every call reads the table again.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::expression::{
    CreateTableExpression, DataRow, DeleteDataExpression, Expression, InsertDataExpression,
};
use crate::processor::{Processor, VersionRow};
use crate::schema::{ColumnDefinition, IndexDefinition, SqlType, SqlValue};

/// Names of the version table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionTableMetaData {
    /// Schema holding the table; `None` for the default schema.
    pub schema_name: Option<String>,
    /// Table name.
    pub table_name: String,
    /// Version column.
    pub column_name: String,
    /// Applied-on column.
    pub applied_on_column_name: String,
    /// Description column.
    pub description_column_name: String,
    /// Name of the unique index on the version column.
    pub unique_index_name: String,
}

impl Default for VersionTableMetaData {
    fn default() -> Self {
        Self {
            schema_name: None,
            table_name: "VersionInfo".to_string(),
            column_name: "Version".to_string(),
            applied_on_column_name: "AppliedOn".to_string(),
            description_column_name: "Description".to_string(),
            unique_index_name: "UC_Version".to_string(),
        }
    }
}

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedgerEntry {
    /// Migration version.
    pub version: i64,
    /// When the migration was applied.
    pub applied_on: DateTime<Utc>,
    /// Migration description.
    pub description: Option<String>,
}

impl From<VersionRow> for VersionLedgerEntry {
    fn from(row: VersionRow) -> Self {
        Self {
            version: row.version,
            applied_on: row
                .applied_on
                .as_deref()
                .map(parse_applied_on)
                .unwrap_or_default(),
            description: row.description.filter(|d| !d.is_empty()),
        }
    }
}

fn parse_applied_on(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_default()
        })
}

/// Reads and writes the version table.
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    meta: VersionTableMetaData,
}

impl VersionLedger {
    /// Creates a ledger over the given table description.
    #[must_use]
    pub fn new(meta: VersionTableMetaData) -> Self {
        Self { meta }
    }

    /// Returns the table description.
    #[must_use]
    pub fn metadata(&self) -> &VersionTableMetaData {
        &self.meta
    }

    fn schema(&self) -> Option<&str> {
        self.meta.schema_name.as_deref()
    }

    /// Fails if a schema is configured but the dialect cannot qualify names with one.
    fn check_schema(&self, processor: &dyn Processor) -> Result<()> {
        match self.schema() {
            Some(schema) if !processor.generator().supports_schemas() => {
                Err(MigrateError::UnsupportedFeature {
                    dialect: processor.dialect().to_string(),
                    feature: format!("a version table in schema '{schema}'"),
                })
            }
            _ => Ok(()),
        }
    }

    fn version_filter(&self, version: i64) -> DataRow {
        DataRow::new().set(self.meta.column_name.clone(), version)
    }

    async fn run(&self, processor: &mut dyn Processor, expression: &Expression) -> Result<()> {
        let sql = processor.generator().render(expression)?;
        processor.execute(&sql).await
    }

    /// Creates the schema, table and unique index if they are missing.
    pub async fn ensure_table(&self, processor: &mut dyn Processor) -> Result<()> {
        self.check_schema(processor)?;
        if let Some(schema) = self.schema() {
            if !processor.schema_exists(schema).await? {
                info!(schema = %schema, "Creating version table schema");
                self.run(processor, &Expression::create_schema(schema)).await?;
            }
        }

        if !processor.table_exists(self.schema(), &self.meta.table_name).await? {
            info!(table = %self.meta.table_name, "Creating version table");
            let mut table = CreateTableExpression::new(self.meta.table_name.clone())
                .column(
                    ColumnDefinition::new(self.meta.column_name.clone(), SqlType::BigInt)
                        .not_null(),
                )
                .column(ColumnDefinition::new(
                    self.meta.applied_on_column_name.clone(),
                    SqlType::Timestamp,
                ))
                .column(ColumnDefinition::new(
                    self.meta.description_column_name.clone(),
                    SqlType::Varchar(1024),
                ));
            table.schema.clone_from(&self.meta.schema_name);
            self.run(processor, &table.into()).await?;
        }

        if !processor
            .index_exists(
                self.schema(),
                &self.meta.table_name,
                &self.meta.unique_index_name,
            )
            .await?
        {
            let mut index = IndexDefinition::new(
                self.meta.unique_index_name.clone(),
                self.meta.table_name.clone(),
            )
            .column(self.meta.column_name.clone())
            .unique();
            index.schema.clone_from(&self.meta.schema_name);
            self.run(processor, &Expression::create_index(index)).await?;
        }

        Ok(())
    }

    /// Returns every entry, latest version first. Empty if the table does not exist.
    pub async fn entries(&self, processor: &mut dyn Processor) -> Result<Vec<VersionLedgerEntry>> {
        self.check_schema(processor)?;
        if !processor.table_exists(self.schema(), &self.meta.table_name).await? {
            return Ok(Vec::new());
        }

        let sql = {
            let generator = processor.generator();
            let version = generator.quote_identifier(&self.meta.column_name);
            format!(
                "SELECT {version}, {}, {} FROM {} ORDER BY {version} DESC",
                generator.quote_identifier(&self.meta.applied_on_column_name),
                generator.quote_identifier(&self.meta.description_column_name),
                generator.quote_table(self.schema(), &self.meta.table_name),
            )
        };

        let rows = processor.fetch_version_rows(&sql).await?;
        Ok(rows.into_iter().map(VersionLedgerEntry::from).collect())
    }

    /// Returns the applied versions, descending.
    pub async fn applied(&self, processor: &mut dyn Processor) -> Result<Vec<i64>> {
        Ok(self
            .entries(processor)
            .await?
            .into_iter()
            .map(|e| e.version)
            .collect())
    }

    /// Returns the highest applied version.
    pub async fn latest(&self, processor: &mut dyn Processor) -> Result<Option<i64>> {
        Ok(self.applied(processor).await?.first().copied())
    }

    /// Checks whether `version` is applied.
    pub async fn is_applied(&self, processor: &mut dyn Processor, version: i64) -> Result<bool> {
        Ok(self.applied(processor).await?.contains(&version))
    }

    /// Records `version` as applied now.
    pub async fn record_applied(
        &self,
        processor: &mut dyn Processor,
        version: i64,
        description: &str,
    ) -> Result<()> {
        if self.is_applied(processor, version).await? {
            return Err(MigrateError::DuplicateApply(version));
        }

        let description = Some(description).filter(|d| !d.is_empty());
        let row = self
            .version_filter(version)
            .set(
                self.meta.applied_on_column_name.clone(),
                Utc::now().to_rfc3339(),
            )
            .set(
                self.meta.description_column_name.clone(),
                SqlValue::from(description),
            );
        let insert = InsertDataExpression::new(self.meta.table_name.clone())
            .in_schema(self.meta.schema_name.clone())
            .row(row);

        self.run(processor, &insert.into()).await?;
        debug!(version, "Recorded migration as applied");
        Ok(())
    }

    /// Removes `version` from the ledger. Returns false if it was not recorded.
    pub async fn record_reverted(&self, processor: &mut dyn Processor, version: i64) -> Result<bool> {
        if !self.is_applied(processor, version).await? {
            warn!(version, "Version not found in version table, nothing to remove");
            return Ok(false);
        }

        let delete = DeleteDataExpression::new(self.meta.table_name.clone())
            .in_schema(self.meta.schema_name.clone())
            .row(self.version_filter(version));

        self.run(processor, &delete.into()).await?;
        debug!(version, "Removed migration from version table");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::SqliteProcessor;

    async fn create_test_processor() -> SqliteProcessor {
        SqliteProcessor::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite processor")
    }

    #[tokio::test]
    async fn test_ensure_table() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();

        // Should not fail
        ledger.ensure_table(&mut processor).await.unwrap();
        // Should be idempotent
        ledger.ensure_table(&mut processor).await.unwrap();

        assert!(processor.table_exists(None, "VersionInfo").await.unwrap());
        assert!(processor
            .index_exists(None, "VersionInfo", "UC_Version")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_schema_rejected_without_schema_support() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::new(VersionTableMetaData {
            schema_name: Some("main".to_string()),
            ..VersionTableMetaData::default()
        });

        for result in [
            ledger.ensure_table(&mut processor).await,
            ledger.entries(&mut processor).await.map(|_| ()),
            ledger.record_applied(&mut processor, 1, "First").await,
        ] {
            match result {
                Err(MigrateError::UnsupportedFeature { dialect, feature }) => {
                    assert_eq!(dialect, "sqlite");
                    assert!(feature.contains("schema 'main'"));
                }
                other => panic!("Expected UnsupportedFeature, got {other:?}"),
            }
        }
        assert!(!processor.table_exists(None, "VersionInfo").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_table_reads_as_empty() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();

        assert!(ledger.applied(&mut processor).await.unwrap().is_empty());
        assert!(!processor.table_exists(None, "VersionInfo").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_and_check_applied() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();
        ledger.ensure_table(&mut processor).await.unwrap();

        // Initially not applied
        assert!(!ledger.is_applied(&mut processor, 1).await.unwrap());

        ledger
            .record_applied(&mut processor, 1, "CreateUsers")
            .await
            .unwrap();

        assert!(ledger.is_applied(&mut processor, 1).await.unwrap());
        let entries = ledger.entries(&mut processor).await.unwrap();
        assert_eq!(entries[0].description.as_deref(), Some("CreateUsers"));
        assert!(entries[0].applied_on > DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn test_applied_is_descending() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();
        ledger.ensure_table(&mut processor).await.unwrap();

        for version in [1, 3, 2] {
            ledger
                .record_applied(&mut processor, version, "")
                .await
                .unwrap();
        }

        assert_eq!(ledger.applied(&mut processor).await.unwrap(), vec![3, 2, 1]);
        assert_eq!(ledger.latest(&mut processor).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_apply() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();
        ledger.ensure_table(&mut processor).await.unwrap();

        ledger.record_applied(&mut processor, 5, "").await.unwrap();
        assert!(matches!(
            ledger.record_applied(&mut processor, 5, "").await,
            Err(MigrateError::DuplicateApply(5))
        ));
    }

    #[tokio::test]
    async fn test_record_reverted() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();
        ledger.ensure_table(&mut processor).await.unwrap();

        ledger.record_applied(&mut processor, 1, "").await.unwrap();
        assert!(ledger.record_reverted(&mut processor, 1).await.unwrap());
        assert!(!ledger.is_applied(&mut processor, 1).await.unwrap());

        // Absent rows are a warning, not an error
        assert!(!ledger.record_reverted(&mut processor, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_table_names() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::new(VersionTableMetaData {
            table_name: "schema_versions".to_string(),
            column_name: "id".to_string(),
            unique_index_name: "ux_schema_versions".to_string(),
            ..VersionTableMetaData::default()
        });
        ledger.ensure_table(&mut processor).await.unwrap();
        ledger.record_applied(&mut processor, 7, "").await.unwrap();

        assert!(processor.table_exists(None, "schema_versions").await.unwrap());
        assert!(processor
            .column_exists(None, "schema_versions", "id")
            .await
            .unwrap());
        assert_eq!(ledger.applied(&mut processor).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_sqlite_timestamp_fallback() {
        let mut processor = create_test_processor().await;
        let ledger = VersionLedger::default();
        ledger.ensure_table(&mut processor).await.unwrap();

        processor
            .execute(
                "INSERT INTO \"VersionInfo\" (\"Version\", \"AppliedOn\") \
                 VALUES (1, '2024-01-02 03:04:05')",
            )
            .await
            .unwrap();

        let entries = ledger.entries(&mut processor).await.unwrap();
        assert_eq!(
            entries[0].applied_on.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-02 03:04:05"
        );
        assert!(entries[0].description.is_none());
    }

    #[test]
    fn test_metadata_from_json() {
        let meta: VersionTableMetaData =
            serde_json::from_str(r#"{"table_name": "migrations"}"#).unwrap();
        assert_eq!(meta.table_name, "migrations");
        assert_eq!(meta.column_name, "Version");
    }
}

//! End-to-end migration runs against SQLite.

use std::time::Duration;

use tidemark::prelude::*;
use tidemark::processor::VersionRow;
use tidemark::runner::RunnerState;

struct CreateUser;

#[async_trait]
impl Migration for CreateUser {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "User",
            [
                ColumnDefinition::new("Id", SqlType::Integer)
                    .primary_key()
                    .identity(),
                ColumnDefinition::new("Name", SqlType::Text),
            ],
        );
        Ok(())
    }
}

struct CreateContexts;

#[async_trait]
impl Migration for CreateContexts {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "Contexts",
            [
                ColumnDefinition::new("Id", SqlType::Integer)
                    .primary_key()
                    .identity(),
                ColumnDefinition::new("Name", SqlType::Varchar(100)).not_null(),
            ],
        );
        Ok(())
    }
}

struct CreateNotes;

#[async_trait]
impl Migration for CreateNotes {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "Notes",
            [
                ColumnDefinition::new("Id", SqlType::Integer)
                    .primary_key()
                    .identity(),
                ColumnDefinition::new("ContextId", SqlType::Integer)
                    .not_null()
                    .references("Contexts", "Id"),
                ColumnDefinition::new("Body", SqlType::Text),
            ],
        )
        .create_index(IndexDefinition::new("IX_Notes_ContextId", "Notes").column("ContextId"));
        Ok(())
    }
}

struct CreateTable(&'static str);

#[async_trait]
impl Migration for CreateTable {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            self.0,
            [ColumnDefinition::new("Id", SqlType::Integer).primary_key()],
        );
        Ok(())
    }
}

/// Creates a table, then fails on its second statement.
struct Broken;

#[async_trait]
impl Migration for Broken {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "Half",
            [ColumnDefinition::new("Id", SqlType::Integer).primary_key()],
        )
        .execute_sql("INSERT INTO \"Missing\" (\"Id\") VALUES (1)");
        Ok(())
    }

    async fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.delete_table("Half");
        Ok(())
    }
}

async fn memory_runner(registrar: &MigrationRegistrar, options: RunnerOptions) -> MigrationRunner {
    let catalog = MigrationLoader::default().load(registrar).unwrap();
    let processor = SqliteProcessor::connect("sqlite::memory:").await.unwrap();
    MigrationRunner::with_options(Box::new(processor), catalog, options)
}

async fn file_runner(url: &str, registrar: &MigrationRegistrar) -> MigrationRunner {
    let catalog = MigrationLoader::default().load(registrar).unwrap();
    let processor = SqliteProcessor::connect(url).await.unwrap();
    MigrationRunner::new(Box::new(processor), catalog)
}

fn contexts_and_notes() -> MigrationRegistrar {
    let mut registrar = MigrationRegistrar::new();
    registrar
        .register(MigrationInfo::new(1, CreateContexts).with_description("Contexts"))
        .register(MigrationInfo::new(2, CreateNotes).with_description("Notes"));
    registrar
}

#[tokio::test]
async fn test_user_table_round_trip() {
    let mut registrar = MigrationRegistrar::new();
    registrar.register(MigrationInfo::new(1, CreateUser).with_description("CreateUser"));
    let mut runner = memory_runner(&registrar, RunnerOptions::default()).await;

    runner.migrate_up(None).await.unwrap();
    assert_eq!(runner.applied_versions().await.unwrap(), vec![1]);
    assert!(runner.processor().table_exists(None, "User").await.unwrap());

    runner.migrate_down(0).await.unwrap();
    assert!(runner.applied_versions().await.unwrap().is_empty());
    assert!(!runner.processor().table_exists(None, "User").await.unwrap());
}

#[tokio::test]
async fn test_second_up_is_a_no_op() {
    let mut runner = memory_runner(&contexts_and_notes(), RunnerOptions::default()).await;

    let first = runner.migrate_up(None).await.unwrap();
    assert_eq!(first.applied, vec![1, 2]);

    let second = runner.migrate_up(None).await.unwrap();
    assert!(second.applied.is_empty());
    assert!(second.statements.is_empty());
    assert_eq!(runner.applied_versions().await.unwrap(), vec![2, 1]);
}

#[tokio::test]
async fn test_only_pending_migrations_run() {
    let mut runner = memory_runner(&contexts_and_notes(), RunnerOptions::default()).await;
    runner.migrate_up(Some(1)).await.unwrap();
    assert_eq!(runner.applied_versions().await.unwrap(), vec![1]);

    let report = runner.migrate_up(None).await.unwrap();
    assert_eq!(report.applied, vec![2]);
    assert_eq!(runner.applied_versions().await.unwrap(), vec![2, 1]);
    assert!(runner
        .processor()
        .index_exists(None, "Notes", "IX_Notes_ContextId")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_failed_migration_leaves_no_trace() {
    let mut registrar = contexts_and_notes();
    registrar.register(MigrationInfo::new(3, Broken).with_description("Broken"));
    let mut runner = memory_runner(&registrar, RunnerOptions::default()).await;

    match runner.migrate_up(None).await {
        Err(MigrateError::MigrationExecution {
            version,
            description,
            ..
        }) => {
            assert_eq!(version, 3);
            assert_eq!(description, "Broken");
        }
        other => panic!("Expected MigrationExecution, got {other:?}"),
    }
    assert_eq!(runner.state(), RunnerState::Failed(3));

    // Earlier migrations stay committed; the failed one is fully undone
    assert!(!runner.processor().table_exists(None, "Half").await.unwrap());
    assert!(runner.processor().table_exists(None, "Notes").await.unwrap());

    let listing = runner.list_migrations().await.unwrap();
    let applied: Vec<(i64, bool)> = listing.iter().map(|s| (s.version, s.applied)).collect();
    assert_eq!(applied, vec![(1, true), (2, true), (3, false)]);
}

#[tokio::test]
async fn test_out_of_order_detection_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    let mut early = MigrationRegistrar::new();
    early
        .register(MigrationInfo::new(1, CreateTable("One")).with_description("One"))
        .register(MigrationInfo::new(3, CreateTable("Three")).with_description("Three"));
    file_runner(&url, &early).await.migrate_up(None).await.unwrap();

    let mut full = MigrationRegistrar::new();
    full.register(MigrationInfo::new(1, CreateTable("One")).with_description("One"))
        .register(MigrationInfo::new(2, CreateTable("Two")).with_description("Two"))
        .register(MigrationInfo::new(3, CreateTable("Three")).with_description("Three"));
    let mut runner = file_runner(&url, &full).await;

    match runner.migrate_up(None).await {
        Err(MigrateError::VersionOrderInvalid { violations }) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].version, 2);
            assert_eq!(violations[0].description, "Two");
        }
        other => panic!("Expected VersionOrderInvalid, got {other:?}"),
    }
    assert!(!runner.processor().table_exists(None, "Two").await.unwrap());
}

#[tokio::test]
async fn test_out_of_order_allowed() {
    let mut registrar = MigrationRegistrar::new();
    registrar
        .register(MigrationInfo::new(1, CreateTable("One")))
        .register(MigrationInfo::new(2, CreateTable("Two")))
        .register(MigrationInfo::new(3, CreateTable("Three")));
    let options = RunnerOptions {
        allow_out_of_order: true,
        ..RunnerOptions::default()
    };
    let mut runner = memory_runner(&registrar, options).await;

    runner.migrate_up(Some(1)).await.unwrap();
    let ledger = runner.ledger().clone();
    ledger
        .record_applied(runner.processor(), 3, "Three")
        .await
        .unwrap();

    let report = runner.migrate_up(None).await.unwrap();
    assert_eq!(report.applied, vec![2]);
    assert_eq!(runner.applied_versions().await.unwrap(), vec![3, 2, 1]);
}

#[tokio::test]
async fn test_ledger_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());

    file_runner(&url, &contexts_and_notes())
        .await
        .migrate_up(Some(1))
        .await
        .unwrap();

    let mut runner = file_runner(&url, &contexts_and_notes()).await;
    let listing = runner.list_migrations().await.unwrap();
    let statuses: Vec<_> = listing.iter().collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].applied);
    assert!(statuses[0].applied_on.is_some());
    assert!(!statuses[1].applied);

    let report = runner.migrate_up(None).await.unwrap();
    assert_eq!(report.applied, vec![2]);
}

#[tokio::test]
async fn test_tag_filtering() {
    let mut registrar = MigrationRegistrar::new();
    registrar
        .register(MigrationInfo::new(1, CreateTable("Shared")))
        .register(MigrationInfo::new(2, CreateTable("TenantOnly")).with_tag("TenantA"));

    for (tags, expected) in [
        (vec!["TenantB"], vec![1]),
        (vec!["TenantA"], vec![1, 2]),
        (vec![], vec![1, 2]),
    ] {
        let catalog = MigrationLoader::new(LoaderFilter::new().tags(tags))
            .load(&registrar)
            .unwrap();
        let processor = SqliteProcessor::connect("sqlite::memory:").await.unwrap();
        let mut runner = MigrationRunner::new(Box::new(processor), catalog);

        let report = runner.migrate_up(None).await.unwrap();
        assert_eq!(report.applied, expected);
    }
}

#[tokio::test]
async fn test_data_migration_reverses_inserts() {
    struct Seed;

    #[async_trait]
    impl Migration for Seed {
        async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
            ctx.insert("Contexts", DataRow::new().set("Id", 1).set("Name", "Inbox"))
                .insert("Contexts", DataRow::new().set("Id", 2).set("Name", "Archive"));
            Ok(())
        }
    }

    let mut registrar = contexts_and_notes();
    registrar.register(MigrationInfo::new(3, Seed).with_description("Seed"));
    let mut runner = memory_runner(&registrar, RunnerOptions::default()).await;

    runner.migrate_up(None).await.unwrap();

    let report = runner.rollback(1).await.unwrap();
    assert_eq!(report.reverted, vec![3]);
    assert_eq!(report.statements.len(), 2);
    assert!(report.statements[0].starts_with("DELETE FROM \"Contexts\""));
    assert_eq!(runner.applied_versions().await.unwrap(), vec![2, 1]);
}

#[tokio::test]
async fn test_irreversible_migration_fails_down() {
    struct RawSql;

    #[async_trait]
    impl Migration for RawSql {
        async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
            ctx.execute_sql("CREATE TABLE \"Raw\" (\"Id\" INTEGER)");
            Ok(())
        }
    }

    let mut registrar = MigrationRegistrar::new();
    registrar.register(MigrationInfo::new(1, RawSql).with_description("RawSql"));
    let mut runner = memory_runner(&registrar, RunnerOptions::default()).await;
    runner.migrate_up(None).await.unwrap();

    let err = runner.migrate_down(0).await.unwrap_err();
    assert_eq!(err.version(), Some(1));
    assert!(err.to_string().contains("RawSql"));
    assert_eq!(runner.applied_versions().await.unwrap(), vec![1]);
}

/// Delegates to SQLite but hangs once after running a statement that
/// mentions `stall_on`.
struct StallingProcessor {
    inner: SqliteProcessor,
    stall_on: Option<&'static str>,
}

#[async_trait]
impl Processor for StallingProcessor {
    fn generator(&self) -> &dyn Generator {
        self.inner.generator()
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.inner.execute(sql).await?;
        if self.stall_on.is_some_and(|needle| sql.contains(needle)) {
            self.stall_on = None;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.inner.begin_transaction().await
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn discard_transaction(&mut self) -> bool {
        self.inner.discard_transaction()
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        self.inner.schema_exists(schema).await
    }

    async fn table_exists(&mut self, schema: Option<&str>, table: &str) -> Result<bool> {
        self.inner.table_exists(schema, table).await
    }

    async fn column_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
    ) -> Result<bool> {
        self.inner.column_exists(schema, table, column).await
    }

    async fn index_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        index: &str,
    ) -> Result<bool> {
        self.inner.index_exists(schema, table, index).await
    }

    async fn constraint_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &str,
    ) -> Result<bool> {
        self.inner.constraint_exists(schema, table, constraint).await
    }

    async fn sequence_exists(&mut self, schema: Option<&str>, sequence: &str) -> Result<bool> {
        self.inner.sequence_exists(schema, sequence).await
    }

    async fn default_value_exists(
        &mut self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<bool> {
        self.inner
            .default_value_exists(schema, table, column, value)
            .await
    }

    async fn fetch_version_rows(&mut self, sql: &str) -> Result<Vec<VersionRow>> {
        self.inner.fetch_version_rows(sql).await
    }
}

#[tokio::test]
async fn test_cancelled_run_rolls_back() {
    let mut registrar = MigrationRegistrar::new();
    registrar.register(MigrationInfo::new(1, CreateTable("Half")).with_description("Half"));
    let catalog = MigrationLoader::default().load(&registrar).unwrap();
    let processor = StallingProcessor {
        inner: SqliteProcessor::connect("sqlite::memory:").await.unwrap(),
        stall_on: Some("\"Half\""),
    };
    let mut runner = MigrationRunner::new(Box::new(processor), catalog);

    let cancelled = tokio::time::timeout(Duration::from_millis(200), runner.migrate_up(None)).await;
    assert!(cancelled.is_err());

    assert_eq!(runner.state(), RunnerState::Failed(1));
    assert!(!runner.processor().in_transaction());
    assert!(!runner.processor().table_exists(None, "Half").await.unwrap());
    assert!(runner.applied_versions().await.unwrap().is_empty());

    let report = runner.migrate_up(None).await.unwrap();
    assert_eq!(report.applied, vec![1]);
    assert_eq!(runner.state(), RunnerState::Idle);
    assert!(runner.processor().table_exists(None, "Half").await.unwrap());
}

#[tokio::test]
async fn test_rerun_with_dialect_gated_migration() {
    let mut registrar = MigrationRegistrar::new();
    registrar
        .register(MigrationInfo::new(1, CreateTable("One")).with_description("One"))
        .register(
            MigrationInfo::new(2, CreateTable("PgOnly"))
                .with_description("PgOnly")
                .with_constraint(MigrationConstraint::only_dialect("postgres")),
        )
        .register(MigrationInfo::new(3, CreateTable("Three")).with_description("Three"));
    let mut runner = memory_runner(&registrar, RunnerOptions::default()).await;

    let first = runner.migrate_up(None).await.unwrap();
    assert_eq!(first.applied, vec![1, 3]);
    assert_eq!(first.skipped, vec![2]);

    let second = runner.migrate_up(None).await.unwrap();
    assert!(second.applied.is_empty());
    assert!(second.statements.is_empty());
    assert_eq!(runner.applied_versions().await.unwrap(), vec![3, 1]);

    let listing = runner.list_migrations().await.unwrap();
    let applied: Vec<(i64, bool)> = listing.iter().map(|s| (s.version, s.applied)).collect();
    assert_eq!(applied, vec![(1, true), (2, false), (3, true)]);
}

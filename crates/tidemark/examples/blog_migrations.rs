//! Example: Blog Application Migrations
//!
//! This example demonstrates how to use tidemark to manage database
//! schema changes for a blog application with users, posts, and tags.
//!
//! Run with: cargo run --example blog_migrations -p tidemark

use tidemark::prelude::*;

// =============================================================================
// Migration Definitions
// =============================================================================

/// Create the users table.
struct CreateUsers;

#[async_trait]
impl Migration for CreateUsers {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "users",
            [
                ColumnDefinition::new("id", SqlType::BigInt)
                    .primary_key()
                    .identity(),
                ColumnDefinition::new("username", SqlType::Varchar(100))
                    .not_null()
                    .unique(),
                ColumnDefinition::new("email", SqlType::Varchar(255)).not_null(),
                ColumnDefinition::new("is_active", SqlType::Boolean)
                    .not_null()
                    .default(true),
                ColumnDefinition::new("created_at", SqlType::Timestamp)
                    .not_null()
                    .default(SqlValue::Expression("CURRENT_TIMESTAMP".to_string())),
            ],
        );
        Ok(())
    }
}

impl VersionedMigration for CreateUsers {
    const VERSION: i64 = 2024_01_01_001;
    const DESCRIPTION: &'static str = "Create users";
}

/// Create the posts table with a foreign key to users.
struct CreatePosts;

#[async_trait]
impl Migration for CreatePosts {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.create_table(
            "posts",
            [
                ColumnDefinition::new("id", SqlType::BigInt)
                    .primary_key()
                    .identity(),
                ColumnDefinition::new("author_id", SqlType::BigInt)
                    .not_null()
                    .references("users", "id")
                    .on_delete(ForeignKeyAction::Cascade),
                ColumnDefinition::new("title", SqlType::Varchar(200)).not_null(),
                ColumnDefinition::new("slug", SqlType::Varchar(200))
                    .not_null()
                    .unique(),
                ColumnDefinition::new("content", SqlType::Text).not_null(),
                ColumnDefinition::new("published_at", SqlType::Timestamp),
            ],
        )
        .create_index(
            IndexDefinition::new("idx_posts_author", "posts")
                .column("author_id")
                .column_desc("published_at"),
        );
        Ok(())
    }
}

impl VersionedMigration for CreatePosts {
    const VERSION: i64 = 2024_01_01_002;
    const DESCRIPTION: &'static str = "Create posts";
}

/// Seed a default admin account.
struct SeedAdmin;

#[async_trait]
impl Migration for SeedAdmin {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.insert(
            "users",
            DataRow::new()
                .set("username", "admin")
                .set("email", "admin@example.com"),
        );
        Ok(())
    }
}

impl VersionedMigration for SeedAdmin {
    const VERSION: i64 = 2024_01_01_003;
    const DESCRIPTION: &'static str = "Seed admin user";
    const TAGS: &'static [&'static str] = &["Development"];
}

/// Denormalize a post count onto users. Raw SQL needs an explicit `down`.
struct AddPostCount;

#[async_trait]
impl Migration for AddPostCount {
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.add_column(
            "users",
            ColumnDefinition::new("post_count", SqlType::Integer)
                .not_null()
                .default(0),
        )
        .execute_sql(
            "UPDATE \"users\" SET \"post_count\" = \
             (SELECT COUNT(*) FROM \"posts\" WHERE \"posts\".\"author_id\" = \"users\".\"id\")",
        );
        Ok(())
    }

    async fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.push(Expression::delete_column("users", "post_count"));
        Ok(())
    }
}

impl VersionedMigration for AddPostCount {
    const VERSION: i64 = 2024_01_01_004;
    const DESCRIPTION: &'static str = "Add post count";
    const BREAKING_CHANGE: bool = true;
}

fn registrar() -> MigrationRegistrar {
    let mut registrar = MigrationRegistrar::new();
    registrar
        .add(CreateUsers)
        .add(CreatePosts)
        .add(SeedAdmin)
        .add(AddPostCount);
    registrar
}

async fn runner(options: RunnerOptions) -> Result<MigrationRunner> {
    let catalog = MigrationLoader::default().load(&registrar())?;
    let processor = SqliteProcessor::connect("sqlite::memory:").await?;
    Ok(MigrationRunner::with_options(
        Box::new(processor),
        catalog,
        options,
    ))
}

fn print_status(statuses: impl Iterator<Item = tidemark::runner::MigrationStatus>) {
    for status in statuses {
        let mark = if status.applied { "X" } else { " " };
        println!("    [{mark}] {} {}", status.version, status.description);
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" TIDEMARK: Blog Application Example");
    println!("{}", "=".repeat(70));
    println!();

    // -------------------------------------------------------------------------
    // Preview the SQL
    // -------------------------------------------------------------------------
    println!("[1] Generated SQL for pending migrations:");
    println!("{}", "-".repeat(70));
    let mut preview = runner(RunnerOptions {
        preview: true,
        ..RunnerOptions::default()
    })
    .await?;
    for sql in preview.migrate_up(None).await?.statements {
        println!("{sql};");
    }
    println!("{}", "-".repeat(70));
    println!();

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------
    let mut runner = runner(RunnerOptions::default()).await?;

    println!("[2] Applying migrations up to {}...", CreatePosts::VERSION);
    let report = runner.migrate_up(Some(CreatePosts::VERSION)).await?;
    println!("    Applied {:?}\n", report.applied);

    println!("[3] Migration status:\n");
    print_status(runner.list_migrations().await?.iter());
    println!();

    println!("[4] Applying the rest...");
    let report = runner.migrate_up(None).await?;
    println!("    Applied {:?}\n", report.applied);

    // -------------------------------------------------------------------------
    // Rollback
    // -------------------------------------------------------------------------
    println!("[5] Rolling back the last two migrations...");
    let report = runner.rollback(2).await?;
    println!("    Reverted {:?}\n", report.reverted);

    println!("[6] Final migration state:\n");
    print_status(runner.list_migrations().await?.iter());
    println!();

    println!("{}", "=".repeat(70));
    println!(" Done.");
    println!("{}", "=".repeat(70));

    Ok(())
}

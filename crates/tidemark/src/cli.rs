//! Command-line front end.
//!
//! Migrations are compiled into the host binary, so the CLI is a library
//! entry point: the host builds a [`MigrationRegistrar`] and hands it to
//! [`run`].
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registrar = MigrationRegistrar::new();
//!     registrar.add(CreateUsers).add(AddEmailToUsers);
//!     tidemark::cli::run(registrar).await
//! }
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::loader::{LoaderFilter, MigrationLoader, MigrationRegistrar, TagMatch};
use crate::registry::DialectRegistry;
use crate::runner::{MigrationReport, MigrationRunner, MigrationStatus, RunnerOptions};

const DEFAULT_DATABASE: &str = "sqlite:db.sqlite3";
const DEFAULT_DIALECT: &str = "sqlite";

/// Versioned database schema migrations.
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL")]
    pub database: Option<String>,

    /// Dialect name.
    #[arg(long, env = "TIDEMARK_DIALECT")]
    pub dialect: Option<String>,

    /// JSON configuration file; flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only run migrations carrying these tags (untagged migrations always run).
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Require every tag instead of any.
    #[arg(long)]
    pub match_all_tags: bool,

    /// Only run migrations in this namespace.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Include namespaces nested below `--namespace`.
    #[arg(long, requires = "namespace")]
    pub nested: bool,

    /// Apply migrations older than the latest applied one instead of failing.
    #[arg(long)]
    pub allow_out_of_order: bool,

    /// Show SQL without executing.
    #[arg(long)]
    pub preview: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Apply pending migrations.
    Up {
        /// Stop after this version.
        #[arg(long)]
        to: Option<i64>,
    },

    /// Revert migrations newer than a version.
    Down {
        /// Version to revert to (0 reverts everything).
        #[arg(long)]
        to: i64,
    },

    /// Revert the most recent migrations.
    Rollback {
        /// Number of migrations to revert.
        #[arg(default_value_t = 1)]
        steps: usize,
    },

    /// Show migration status.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check that no unapplied migration is older than the latest applied one.
    Validate,

    /// Print the SQL that `up` (or `down`) would run.
    Sql {
        /// Show rollback SQL instead of forward SQL.
        #[arg(long)]
        down: bool,

        /// Target version.
        #[arg(long)]
        to: Option<i64>,
    },
}

/// Settings that can come from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Database URL.
    pub database: Option<String>,
    /// Dialect name.
    pub dialect: Option<String>,
    /// Loader filter.
    pub filter: LoaderFilter,
    /// Runner options.
    pub runner: RunnerOptions,
}

impl CliConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Configuration with flags applied on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Database URL.
    pub database: String,
    /// Dialect name.
    pub dialect: String,
    /// Loader filter.
    pub filter: LoaderFilter,
    /// Runner options.
    pub options: RunnerOptions,
}

impl Settings {
    /// Merges the configuration file (if any) with the command-line flags.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => CliConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => CliConfig::default(),
        };

        let mut filter = config.filter;
        if let Some(namespace) = &cli.namespace {
            filter.namespace = Some(namespace.clone());
            filter.include_nested = cli.nested;
        }
        if !cli.tags.is_empty() {
            filter.tags = cli.tags.iter().cloned().collect();
        }
        if cli.match_all_tags {
            filter.tag_match = TagMatch::All;
        }

        let mut options = config.runner;
        options.allow_out_of_order |= cli.allow_out_of_order;
        options.preview |= cli.preview || matches!(cli.command, Commands::Sql { .. });

        Ok(Self {
            database: cli
                .database
                .clone()
                .or(config.database)
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            dialect: cli
                .dialect
                .clone()
                .or(config.dialect)
                .unwrap_or_else(|| DEFAULT_DIALECT.to_string()),
            filter,
            options,
        })
    }
}

/// Installs the log subscriber.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Parses the command line, sets up logging and runs the command.
pub async fn run(registrar: MigrationRegistrar) -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    execute(&cli, &registrar, &DialectRegistry::with_defaults()).await
}

fn print_statements(report: &MigrationReport) {
    for sql in &report.statements {
        println!("{sql};");
    }
}

fn print_listing(statuses: &[MigrationStatus]) {
    if statuses.is_empty() {
        info!("No migrations found.");
        return;
    }

    println!("\nMigrations:");
    println!("{:-<60}", "");
    for status in statuses {
        let mark = if status.applied { "X" } else { " " };
        let applied_on = status
            .applied_on
            .map(|d| format!(" ({})", d.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default();
        let breaking = if status.breaking_change { " [breaking]" } else { "" };
        let missing = if status.in_catalog { "" } else { " [not in catalog]" };
        println!(
            " [{mark}] {} {}{applied_on}{breaking}{missing}",
            status.version, status.description
        );
    }
    println!();
}

/// Runs a parsed command.
pub async fn execute(
    cli: &Cli,
    registrar: &MigrationRegistrar,
    registry: &DialectRegistry,
) -> anyhow::Result<()> {
    let settings = Settings::resolve(cli)?;

    let catalog = match MigrationLoader::new(settings.filter.clone()).load(registrar) {
        Ok(catalog) => catalog,
        Err(e) if !e.is_fatal() => {
            warn!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let processor = registry
        .processor(&settings.dialect, &settings.database)
        .await?;
    let preview = settings.options.preview;
    let mut runner = MigrationRunner::with_options(processor, catalog, settings.options);

    match &cli.command {
        Commands::Up { to } => {
            let report = runner.migrate_up(*to).await?;
            if preview {
                print_statements(&report);
            } else {
                info!(
                    applied = report.applied.len(),
                    skipped = report.skipped.len(),
                    "Migration complete"
                );
            }
        }

        Commands::Down { to } => {
            let report = runner.migrate_down(*to).await?;
            if preview {
                print_statements(&report);
            } else {
                info!(reverted = report.reverted.len(), "Rollback complete");
            }
        }

        Commands::Rollback { steps } => {
            let report = runner.rollback(*steps).await?;
            if preview {
                print_statements(&report);
            } else {
                info!(reverted = report.reverted.len(), "Rollback complete");
            }
        }

        Commands::List { json } => {
            let listing = runner.list_migrations().await?;
            let statuses: Vec<MigrationStatus> = listing.iter().collect();
            if *json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print_listing(&statuses);
            }
        }

        Commands::Validate => {
            runner.validate_version_order().await?;
            info!("Migration order is valid.");
        }

        Commands::Sql { down, to } => {
            let report = if *down {
                runner.migrate_down(to.unwrap_or(0)).await?
            } else {
                runner.migrate_up(*to).await?
            };
            print_statements(&report);
        }
    }

    Ok(())
}

//! Migration runner.
//!
//! Compares the catalog against the version ledger and applies or reverts
//! migrations one at a time. Each migration's expressions are collected,
//! validated and rendered before its transaction begins; the statements and
//! the ledger update then run inside that transaction and commit together.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::MigrationContext;
use crate::error::{MigrateError, OrderViolation, Result};
use crate::expression::Expression;
use crate::ledger::{VersionLedger, VersionLedgerEntry, VersionTableMetaData};
use crate::loader::MigrationCatalog;
use crate::migration::{ConstraintContext, MigrationInfo, TransactionBehavior};
use crate::processor::Processor;

/// Runner settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Apply unapplied migrations older than the latest applied one instead
    /// of failing.
    pub allow_out_of_order: bool,
    /// Render and report SQL without executing it or touching the ledger.
    pub preview: bool,
    /// Version table names.
    pub version_table: VersionTableMetaData,
}

/// Observable runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Not running.
    Idle,
    /// Reading the ledger and working out what to run.
    ComputingPlan,
    /// Running a migration.
    Executing(i64),
    /// Recording a migration and committing.
    Committing(i64),
    /// A migration failed; the runner stopped.
    Failed(i64),
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Versions applied, in order.
    pub applied: Vec<i64>,
    /// Versions reverted, in order.
    pub reverted: Vec<i64>,
    /// Versions skipped because a constraint vetoed them.
    pub skipped: Vec<i64>,
    /// Statements executed (or, in preview mode, rendered).
    pub statements: Vec<String>,
}

/// One line of a migration listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration version.
    pub version: i64,
    /// Description from the catalog, or from the ledger for unknown versions.
    pub description: String,
    /// Whether the version is recorded in the ledger.
    pub applied: bool,
    /// When it was applied.
    pub applied_on: Option<DateTime<Utc>>,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether the migration is a breaking change.
    pub breaking_change: bool,
    /// Whether the version is present in the catalog.
    pub in_catalog: bool,
}

/// Snapshot of catalog and ledger, listed lazily in ascending version order.
#[derive(Debug)]
pub struct MigrationListing<'a> {
    catalog: &'a MigrationCatalog,
    entries: BTreeMap<i64, VersionLedgerEntry>,
    versions: BTreeSet<i64>,
}

impl<'a> MigrationListing<'a> {
    fn new(catalog: &'a MigrationCatalog, entries: Vec<VersionLedgerEntry>) -> Self {
        let entries: BTreeMap<i64, VersionLedgerEntry> =
            entries.into_iter().map(|e| (e.version, e)).collect();
        let versions = catalog.versions().chain(entries.keys().copied()).collect();
        Self {
            catalog,
            entries,
            versions,
        }
    }

    /// Iterates over every known version. Can be called any number of times.
    pub fn iter(&self) -> impl Iterator<Item = MigrationStatus> + '_ {
        self.versions.iter().map(|&version| self.status(version))
    }

    /// Returns the number of listed versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    fn status(&self, version: i64) -> MigrationStatus {
        let entry = self.entries.get(&version);
        let info = self.catalog.get(version);

        let description = match (info, entry) {
            (Some(info), _) => info.description().to_string(),
            (None, Some(entry)) => entry.description.clone().unwrap_or_default(),
            (None, None) => String::new(),
        };

        MigrationStatus {
            version,
            description,
            applied: entry.is_some(),
            applied_on: entry.map(|e| e.applied_on),
            tags: info
                .map(|i| i.tags().iter().cloned().collect())
                .unwrap_or_default(),
            breaking_change: info.is_some_and(MigrationInfo::is_breaking_change),
            in_catalog: info.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

fn execution_error(
    info: &MigrationInfo,
    expression: impl Into<String>,
    source: MigrateError,
) -> MigrateError {
    MigrateError::MigrationExecution {
        version: info.version(),
        description: info.description().to_string(),
        expression: expression.into(),
        source: Box::new(source),
    }
}

/// Marks a migration as in flight. If the run is dropped before
/// [`InFlight::finish`], the open transaction is discarded and the runner
/// is left in `Failed(version)`.
struct InFlight<'a> {
    runner: &'a mut MigrationRunner,
    version: i64,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(runner: &'a mut MigrationRunner, version: i64) -> Self {
        Self {
            runner,
            version,
            done: false,
        }
    }

    fn finish(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!(version = self.version, "Migration cancelled");
        self.runner.processor.discard_transaction();
        self.runner.state = RunnerState::Failed(self.version);
    }
}

/// Applies and reverts migrations against one processor.
pub struct MigrationRunner {
    processor: Box<dyn Processor>,
    catalog: MigrationCatalog,
    ledger: VersionLedger,
    options: RunnerOptions,
    state: RunnerState,
}

impl MigrationRunner {
    /// Creates a runner with default options.
    #[must_use]
    pub fn new(processor: Box<dyn Processor>, catalog: MigrationCatalog) -> Self {
        Self::with_options(processor, catalog, RunnerOptions::default())
    }

    /// Creates a runner with the given options.
    #[must_use]
    pub fn with_options(
        processor: Box<dyn Processor>,
        catalog: MigrationCatalog,
        options: RunnerOptions,
    ) -> Self {
        let ledger = VersionLedger::new(options.version_table.clone());
        Self {
            processor,
            catalog,
            ledger,
            options,
            state: RunnerState::Idle,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Returns the processor, for schema queries.
    pub fn processor(&mut self) -> &mut dyn Processor {
        self.processor.as_mut()
    }

    /// Returns the applied versions, descending.
    pub async fn applied_versions(&mut self) -> Result<Vec<i64>> {
        self.ledger.applied(self.processor.as_mut()).await
    }

    /// Unapplied migrations older than the latest applied one. Migrations a
    /// constraint currently vetoes are never run here, so they are not counted.
    fn order_violations(&self, applied: &BTreeSet<i64>) -> Vec<OrderViolation> {
        let Some(&latest) = applied.last() else {
            return Vec::new();
        };
        let constraints = ConstraintContext::new(applied, self.processor.dialect());
        self.catalog
            .iter()
            .filter(|info| info.version() < latest && !applied.contains(&info.version()))
            .filter(|info| info.vetoed_by(&constraints).is_none())
            .map(|info| OrderViolation {
                version: info.version(),
                description: info.description().to_string(),
            })
            .collect()
    }

    /// Checks that no unapplied migration is older than the latest applied one.
    pub async fn validate_version_order(&mut self) -> Result<()> {
        let applied: BTreeSet<i64> = self.applied_versions().await?.into_iter().collect();
        let violations = self.order_violations(&applied);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::VersionOrderInvalid { violations })
        }
    }

    /// Lists every catalog and ledger version with its status.
    pub async fn list_migrations(&mut self) -> Result<MigrationListing<'_>> {
        let entries = self.ledger.entries(self.processor.as_mut()).await?;
        Ok(MigrationListing::new(&self.catalog, entries))
    }

    /// Applies pending migrations in ascending order, up to and including
    /// `target` when given.
    pub async fn migrate_up(&mut self, target: Option<i64>) -> Result<MigrationReport> {
        let result = self.migrate_up_inner(target).await;
        self.finish(result)
    }

    /// Reverts applied migrations newer than `target`, latest first.
    pub async fn migrate_down(&mut self, target: i64) -> Result<MigrationReport> {
        let result = self.migrate_down_inner(Some(target), None).await;
        self.finish(result)
    }

    /// Reverts the `steps` most recently applied migrations.
    pub async fn rollback(&mut self, steps: usize) -> Result<MigrationReport> {
        let result = self.migrate_down_inner(None, Some(steps)).await;
        self.finish(result)
    }

    fn finish(&mut self, result: Result<MigrationReport>) -> Result<MigrationReport> {
        if result.is_ok() || !matches!(self.state, RunnerState::Failed(_)) {
            self.state = RunnerState::Idle;
        }
        result
    }

    /// Rolls back a transaction left open by a run that never finished.
    async fn recover(&mut self) -> Result<()> {
        if self.processor.in_transaction() {
            warn!("Rolling back a transaction left open by an earlier run");
            self.processor.rollback().await?;
        }
        Ok(())
    }

    async fn migrate_up_inner(&mut self, target: Option<i64>) -> Result<MigrationReport> {
        self.recover().await?;
        self.state = RunnerState::ComputingPlan;
        let mut report = MigrationReport::default();

        if !self.options.preview {
            self.ledger.ensure_table(self.processor.as_mut()).await?;
        }

        let mut applied: BTreeSet<i64> = self.applied_versions().await?.into_iter().collect();

        let violations = self.order_violations(&applied);
        if !violations.is_empty() {
            if !self.options.allow_out_of_order {
                return Err(MigrateError::VersionOrderInvalid { violations });
            }
            for violation in &violations {
                warn!(version = violation.version, "Applying migration out of order");
            }
        }

        let pending: Vec<i64> = self
            .catalog
            .versions()
            .filter(|v| !applied.contains(v))
            .filter(|v| target.map_or(true, |t| *v <= t))
            .collect();

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(report);
        }
        debug!(count = pending.len(), "Computed migration plan");

        for version in pending {
            let Some(info) = self.catalog.get(version).cloned() else {
                return Err(MigrateError::MigrationNotFound(version));
            };

            let dialect = self.processor.dialect().to_string();
            if let Some(constraint) = info.vetoed_by(&ConstraintContext::new(&applied, &dialect)) {
                info!(
                    version,
                    constraint = %constraint.description(),
                    "Skipping migration, constraint not satisfied"
                );
                report.skipped.push(version);
                continue;
            }

            self.run_migration(&info, Direction::Up, &mut report).await?;
            applied.insert(version);
            report.applied.push(version);
        }

        info!(count = report.applied.len(), "Migrations applied");
        Ok(report)
    }

    async fn migrate_down_inner(
        &mut self,
        target: Option<i64>,
        steps: Option<usize>,
    ) -> Result<MigrationReport> {
        self.recover().await?;
        self.state = RunnerState::ComputingPlan;
        let mut report = MigrationReport::default();

        let applied = self.applied_versions().await?;
        let to_revert: Vec<i64> = match (target, steps) {
            (Some(target), _) => applied.into_iter().filter(|v| *v > target).collect(),
            (None, Some(steps)) => applied.into_iter().take(steps).collect(),
            (None, None) => applied,
        };

        // Everything to revert must be known before anything runs
        if let Some(&missing) = to_revert.iter().find(|v| !self.catalog.contains(**v)) {
            return Err(MigrateError::MigrationNotFound(missing));
        }

        if to_revert.is_empty() {
            info!("No migrations to revert");
            return Ok(report);
        }

        for version in to_revert {
            let Some(info) = self.catalog.get(version).cloned() else {
                return Err(MigrateError::MigrationNotFound(version));
            };
            self.run_migration(&info, Direction::Down, &mut report).await?;
            report.reverted.push(version);
        }

        info!(count = report.reverted.len(), "Migrations reverted");
        Ok(report)
    }

    /// Collects, validates and renders one migration, then executes it.
    async fn run_migration(
        &mut self,
        info: &MigrationInfo,
        direction: Direction,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let version = info.version();
        self.state = RunnerState::Executing(version);

        match direction {
            Direction::Up => {
                info!(version, description = %info.description(), "Applying migration");
            }
            Direction::Down => {
                info!(version, description = %info.description(), "Reverting migration");
            }
        }

        let prepared = self.prepare(info, direction).await;
        let statements = match prepared {
            Ok(statements) => statements,
            Err(e) => {
                self.state = RunnerState::Failed(version);
                return Err(e);
            }
        };

        if self.options.preview {
            for (_, sql) in &statements {
                info!(version, sql = %sql, "Preview");
                report.statements.push(sql.clone());
            }
            return Ok(());
        }

        let transactional = info.transaction_behavior() == TransactionBehavior::Default;
        let outcome = {
            let mut guard = InFlight::new(self, version);
            let outcome = guard
                .runner
                .execute(info, direction, &statements, transactional)
                .await;
            guard.finish();
            outcome
        };
        match outcome {
            Ok(()) => {
                report
                    .statements
                    .extend(statements.into_iter().map(|(_, sql)| sql));
                Ok(())
            }
            Err(e) => {
                if self.processor.in_transaction() {
                    if let Err(rollback) = self.processor.rollback().await {
                        warn!(version, error = %rollback, "Rollback failed");
                    }
                } else if !transactional {
                    warn!(
                        version,
                        "Migration ran without a transaction; earlier statements were not undone"
                    );
                }
                self.state = RunnerState::Failed(version);
                Err(e)
            }
        }
    }

    /// Collects the migration's expressions, validates all of them and
    /// renders each to SQL. Nothing touches the database here except the
    /// schema queries the migration itself makes.
    async fn prepare(
        &mut self,
        info: &MigrationInfo,
        direction: Direction,
    ) -> Result<Vec<(String, String)>> {
        let version = info.version();

        let expressions = {
            let mut ctx = MigrationContext::new(self.processor.as_mut(), version);
            let collected = match direction {
                Direction::Up => info.migration().up(&mut ctx).await,
                Direction::Down => info.migration().down(&mut ctx).await,
            };
            collected.map_err(|e| execution_error(info, "collecting expressions", e))?;
            ctx.into_expressions()
        };

        let errors: Vec<String> = expressions.iter().flat_map(Expression::validate).collect();
        if !errors.is_empty() {
            return Err(MigrateError::Validation {
                version,
                description: info.description().to_string(),
                errors,
            });
        }

        let generator = self.processor.generator();
        expressions
            .iter()
            .map(|expression| {
                generator
                    .render(expression)
                    .map(|sql| (expression.description(), sql))
                    .map_err(|e| execution_error(info, expression.description(), e))
            })
            .collect()
    }

    async fn execute(
        &mut self,
        info: &MigrationInfo,
        direction: Direction,
        statements: &[(String, String)],
        transactional: bool,
    ) -> Result<()> {
        let version = info.version();

        if transactional {
            self.processor
                .begin_transaction()
                .await
                .map_err(|e| execution_error(info, "beginning transaction", e))?;
        }

        for (description, sql) in statements {
            self.processor
                .execute(sql)
                .await
                .map_err(|e| execution_error(info, description.clone(), e))?;
        }

        self.state = RunnerState::Committing(version);
        let recorded = match direction {
            Direction::Up => {
                self.ledger
                    .record_applied(self.processor.as_mut(), version, info.description())
                    .await
            }
            Direction::Down => self
                .ledger
                .record_reverted(self.processor.as_mut(), version)
                .await
                .map(|_| ()),
        };
        recorded.map_err(|e| execution_error(info, "updating version table", e))?;

        if transactional {
            self.processor
                .commit()
                .await
                .map_err(|e| execution_error(info, "committing", e))?;
        }
        Ok(())
    }
}

//! Migration definitions.
//!
//! A migration is any type implementing [`Migration`]. Its metadata lives in
//! a [`MigrationInfo`], built either by hand or from the associated
//! constants of [`VersionedMigration`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::MigrationContext;
use crate::error::{MigrateError, Result};

/// A unit of schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Pushes the expressions that apply this migration.
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;

    /// Pushes the expressions that revert this migration.
    ///
    /// The default derives them from `up`: every expression `up` produces is
    /// reversed, in reverse order. Fails with [`MigrateError::NotReversible`]
    /// if any of them has no reverse.
    async fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let forward = {
            let mut scratch = ctx.scratch();
            self.up(&mut scratch).await?;
            scratch.into_expressions()
        };

        for expression in forward.iter().rev() {
            let reverse = expression
                .reverse()
                .ok_or_else(|| MigrateError::NotReversible(expression.description()))?;
            ctx.push(reverse);
        }
        Ok(())
    }
}

/// Whether a migration runs inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionBehavior {
    /// Run inside a transaction.
    #[default]
    Default,
    /// Run without a transaction (e.g. for statements the database refuses
    /// to run transactionally).
    None,
}

/// What a constraint predicate can see.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    applied: &'a BTreeSet<i64>,
    dialect: &'a str,
}

impl<'a> ConstraintContext<'a> {
    /// Creates a context over the applied versions and target dialect.
    #[must_use]
    pub fn new(applied: &'a BTreeSet<i64>, dialect: &'a str) -> Self {
        Self { applied, dialect }
    }

    /// Returns the applied versions.
    #[must_use]
    pub fn applied(&self) -> &BTreeSet<i64> {
        self.applied
    }

    /// Returns true if `version` is applied.
    #[must_use]
    pub fn is_applied(&self, version: i64) -> bool {
        self.applied.contains(&version)
    }

    /// Returns the target dialect name.
    #[must_use]
    pub fn dialect(&self) -> &str {
        self.dialect
    }
}

type Predicate = dyn Fn(&ConstraintContext<'_>) -> bool + Send + Sync;

/// A predicate that must hold for a migration to run. If any constraint
/// vetoes, the migration is skipped.
#[derive(Clone)]
pub struct MigrationConstraint {
    description: String,
    predicate: Arc<Predicate>,
}

impl MigrationConstraint {
    /// Creates a constraint from a predicate.
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ConstraintContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Requires `version` to be applied first.
    #[must_use]
    pub fn requires_version(version: i64) -> Self {
        Self::new(format!("requires version {version}"), move |ctx| {
            ctx.is_applied(version)
        })
    }

    /// Runs only against `dialect`.
    #[must_use]
    pub fn only_dialect(dialect: &str) -> Self {
        let expected = dialect.to_string();
        Self::new(format!("only runs on {dialect}"), move |ctx| {
            ctx.dialect() == expected
        })
    }

    /// Returns the constraint description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn allows(&self, ctx: &ConstraintContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for MigrationConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConstraint")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A migration and its metadata.
#[derive(Clone)]
pub struct MigrationInfo {
    version: i64,
    description: String,
    namespace: Option<String>,
    tags: BTreeSet<String>,
    transaction_behavior: TransactionBehavior,
    breaking_change: bool,
    constraints: Vec<MigrationConstraint>,
    migration: Arc<dyn Migration>,
}

impl MigrationInfo {
    /// Creates metadata for `migration` at `version`.
    pub fn new(version: i64, migration: impl Migration + 'static) -> Self {
        Self {
            version,
            description: String::new(),
            namespace: None,
            tags: BTreeSet::new(),
            transaction_behavior: TransactionBehavior::Default,
            breaking_change: false,
            constraints: Vec::new(),
            migration: Arc::new(migration),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Adds several tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the transaction behaviour.
    #[must_use]
    pub fn with_transaction_behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.transaction_behavior = behavior;
        self
    }

    /// Marks the migration as a breaking change.
    #[must_use]
    pub fn with_breaking_change(mut self) -> Self {
        self.breaking_change = true;
        self
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: MigrationConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Returns the version.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns the transaction behaviour.
    #[must_use]
    pub fn transaction_behavior(&self) -> TransactionBehavior {
        self.transaction_behavior
    }

    /// Returns true if the migration is a breaking change.
    #[must_use]
    pub fn is_breaking_change(&self) -> bool {
        self.breaking_change
    }

    /// Returns the constraints.
    #[must_use]
    pub fn constraints(&self) -> &[MigrationConstraint] {
        &self.constraints
    }

    /// Returns the first constraint that vetoes, if any.
    #[must_use]
    pub fn vetoed_by(&self, ctx: &ConstraintContext<'_>) -> Option<&MigrationConstraint> {
        self.constraints.iter().find(|c| !c.allows(ctx))
    }

    /// Returns the migration.
    #[must_use]
    pub fn migration(&self) -> &dyn Migration {
        self.migration.as_ref()
    }
}

impl fmt::Debug for MigrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationInfo")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("namespace", &self.namespace)
            .field("tags", &self.tags)
            .field("transaction_behavior", &self.transaction_behavior)
            .field("breaking_change", &self.breaking_change)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

/// Metadata for a migration type, declared as associated constants.
///
/// ```rust,ignore
/// pub struct CreateUsers;
///
/// impl VersionedMigration for CreateUsers {
///     const VERSION: i64 = 20240101120000;
///     const TAGS: &'static [&'static str] = &["TenantA"];
/// }
/// ```
pub trait VersionedMigration: Migration + Sized + 'static {
    /// Version number; migrations run in ascending order.
    const VERSION: i64;

    /// Description; the type name is used when empty.
    const DESCRIPTION: &'static str = "";

    /// Tags used by the loader filter.
    const TAGS: &'static [&'static str] = &[];

    /// Transaction behaviour.
    const TRANSACTION: TransactionBehavior = TransactionBehavior::Default;

    /// Whether the migration is a breaking change.
    const BREAKING_CHANGE: bool = false;

    /// Converts to a [`MigrationInfo`]. The namespace is the type's module path.
    fn into_info(self) -> MigrationInfo {
        let type_name = std::any::type_name::<Self>();
        let (namespace, name) = type_name.rsplit_once("::").unwrap_or(("", type_name));

        let description = if Self::DESCRIPTION.is_empty() {
            name
        } else {
            Self::DESCRIPTION
        };

        let mut info = MigrationInfo::new(Self::VERSION, self)
            .with_description(description)
            .with_tags(Self::TAGS.iter().copied())
            .with_transaction_behavior(Self::TRANSACTION);
        if !namespace.is_empty() {
            info = info.with_namespace(namespace);
        }
        if Self::BREAKING_CHANGE {
            info = info.with_breaking_change();
        }
        info
    }
}

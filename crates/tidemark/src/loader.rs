//! Migration discovery and filtering.
//!
//! Migrations are registered explicitly on a [`MigrationRegistrar`]. The
//! [`MigrationLoader`] filters the registered set by namespace and tags and
//! produces a [`MigrationCatalog`] ordered by version.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::{MigrationInfo, VersionedMigration};

/// Collects migrations in registration order.
#[derive(Debug, Default)]
pub struct MigrationRegistrar {
    migrations: Vec<MigrationInfo>,
}

impl MigrationRegistrar {
    /// Creates an empty registrar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration.
    pub fn register(&mut self, info: MigrationInfo) -> &mut Self {
        self.migrations.push(info);
        self
    }

    /// Registers a migration described by associated constants.
    pub fn add<M: VersionedMigration>(&mut self, migration: M) -> &mut Self {
        self.register(migration.into_info())
    }

    /// Lets a module register its own migrations.
    pub fn include(&mut self, module: impl FnOnce(&mut Self)) -> &mut Self {
        module(self);
        self
    }

    /// Returns the registered migrations.
    #[must_use]
    pub fn migrations(&self) -> &[MigrationInfo] {
        &self.migrations
    }

    /// Returns the number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// How a migration's tags are matched against the active tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// Included if it carries any active tag.
    #[default]
    Any,
    /// Included if it carries every active tag.
    All,
}

/// Which registered migrations to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderFilter {
    /// Only load migrations in this namespace.
    pub namespace: Option<String>,
    /// Also load migrations in namespaces nested below `namespace`.
    pub include_nested: bool,
    /// Active tags. Empty means no tag filtering.
    pub tags: BTreeSet<String>,
    /// Tag matching mode.
    pub tag_match: TagMatch,
}

impl LoaderFilter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to a namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>, include_nested: bool) -> Self {
        self.namespace = Some(namespace.into());
        self.include_nested = include_nested;
        self
    }

    /// Sets the active tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tag matching mode.
    #[must_use]
    pub fn tag_match(mut self, tag_match: TagMatch) -> Self {
        self.tag_match = tag_match;
        self
    }

    /// Returns true if `info` passes the filter.
    #[must_use]
    pub fn matches(&self, info: &MigrationInfo) -> bool {
        self.matches_namespace(info.namespace()) && self.matches_tags(info.tags())
    }

    fn matches_namespace(&self, namespace: Option<&str>) -> bool {
        let Some(wanted) = self.namespace.as_deref() else {
            return true;
        };
        match namespace {
            Some(actual) if actual == wanted => true,
            Some(actual) if self.include_nested => actual
                .strip_prefix(wanted)
                .is_some_and(|rest| rest.starts_with("::")),
            _ => false,
        }
    }

    fn matches_tags(&self, tags: &BTreeSet<String>) -> bool {
        // Untagged migrations always run
        if self.tags.is_empty() || tags.is_empty() {
            return true;
        }
        match self.tag_match {
            TagMatch::Any => self.tags.iter().any(|t| tags.contains(t)),
            TagMatch::All => self.tags.iter().all(|t| tags.contains(t)),
        }
    }

    fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(namespace) = &self.namespace {
            parts.push(format!("namespace '{namespace}'"));
        }
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            parts.push(format!("tags [{}] ({:?})", tags.join(", "), self.tag_match));
        }
        if parts.is_empty() {
            "no filter".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Loaded migrations keyed by version, ascending.
#[derive(Debug, Clone, Default)]
pub struct MigrationCatalog {
    migrations: BTreeMap<i64, MigrationInfo>,
}

impl MigrationCatalog {
    /// Returns the migration with `version`.
    #[must_use]
    pub fn get(&self, version: i64) -> Option<&MigrationInfo> {
        self.migrations.get(&version)
    }

    /// Returns true if `version` is in the catalog.
    #[must_use]
    pub fn contains(&self, version: i64) -> bool {
        self.migrations.contains_key(&version)
    }

    /// Returns the versions, ascending.
    pub fn versions(&self) -> impl Iterator<Item = i64> + '_ {
        self.migrations.keys().copied()
    }

    /// Iterates over the migrations, ascending.
    pub fn iter(&self) -> btree_map::Values<'_, i64, MigrationInfo> {
        self.migrations.values()
    }

    /// Returns the number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<'a> IntoIterator for &'a MigrationCatalog {
    type Item = &'a MigrationInfo;
    type IntoIter = btree_map::Values<'a, i64, MigrationInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builds catalogs from a registrar.
#[derive(Debug, Clone, Default)]
pub struct MigrationLoader {
    filter: LoaderFilter,
}

impl MigrationLoader {
    /// Creates a loader with the given filter.
    #[must_use]
    pub fn new(filter: LoaderFilter) -> Self {
        Self { filter }
    }

    /// Returns the filter.
    #[must_use]
    pub fn filter(&self) -> &LoaderFilter {
        &self.filter
    }

    /// Filters the registrar's migrations into a catalog.
    ///
    /// Fails with [`MigrateError::DuplicateVersion`] if two selected
    /// migrations share a version, and with the non-fatal
    /// [`MigrateError::NoMigrationsFound`] if nothing is selected.
    pub fn load(&self, registrar: &MigrationRegistrar) -> Result<MigrationCatalog> {
        let mut migrations: BTreeMap<i64, MigrationInfo> = BTreeMap::new();

        for info in registrar.migrations() {
            if !self.filter.matches(info) {
                debug!(version = info.version(), "Migration excluded by filter");
                continue;
            }

            match migrations.entry(info.version()) {
                btree_map::Entry::Occupied(existing) => {
                    return Err(MigrateError::DuplicateVersion {
                        version: info.version(),
                        first: existing.get().description().to_string(),
                        second: info.description().to_string(),
                    });
                }
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(info.clone());
                }
            }
        }

        if migrations.is_empty() {
            return Err(MigrateError::NoMigrationsFound {
                filter: self.filter.summary(),
            });
        }

        debug!(count = migrations.len(), "Loaded migrations");
        Ok(MigrationCatalog { migrations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MigrationContext;
    use crate::migration::Migration;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Migration for Noop {
        async fn up(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn info(version: i64, description: &str) -> MigrationInfo {
        MigrationInfo::new(version, Noop).with_description(description)
    }

    fn registrar() -> MigrationRegistrar {
        let mut registrar = MigrationRegistrar::new();
        registrar
            .register(info(3, "Third"))
            .register(info(1, "First"))
            .register(info(2, "TenantA").with_tag("TenantA"))
            .register(info(4, "Both").with_tags(["TenantA", "TenantB"]));
        registrar
    }

    fn versions(catalog: &MigrationCatalog) -> Vec<i64> {
        catalog.versions().collect()
    }

    #[test]
    fn test_catalog_is_ordered() {
        let catalog = MigrationLoader::default().load(&registrar()).unwrap();
        assert_eq!(versions(&catalog), vec![1, 2, 3, 4]);
        assert_eq!(catalog.get(3).unwrap().description(), "Third");
    }

    #[test]
    fn test_duplicate_version() {
        let mut registrar = registrar();
        registrar.register(info(2, "Again"));

        match MigrationLoader::default().load(&registrar) {
            Err(MigrateError::DuplicateVersion {
                version,
                first,
                second,
            }) => {
                assert_eq!(version, 2);
                assert_eq!(first, "TenantA");
                assert_eq!(second, "Again");
            }
            other => panic!("Expected DuplicateVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_tag_filter() {
        let loader = MigrationLoader::new(LoaderFilter::new().tags(["TenantB"]));
        assert_eq!(versions(&loader.load(&registrar()).unwrap()), vec![1, 3, 4]);

        let loader = MigrationLoader::new(LoaderFilter::new().tags(["TenantA"]));
        assert_eq!(versions(&loader.load(&registrar()).unwrap()), vec![1, 2, 3, 4]);

        let loader = MigrationLoader::new(
            LoaderFilter::new()
                .tags(["TenantA", "TenantB"])
                .tag_match(TagMatch::All),
        );
        assert_eq!(versions(&loader.load(&registrar()).unwrap()), vec![1, 3, 4]);
    }

    #[test]
    fn test_namespace_filter() {
        let mut registrar = MigrationRegistrar::new();
        registrar
            .register(info(1, "Core").with_namespace("app::core"))
            .register(info(2, "Billing").with_namespace("app::core::billing"))
            .register(info(3, "Other").with_namespace("app::corely"));

        let loader = MigrationLoader::new(LoaderFilter::new().namespace("app::core", false));
        assert_eq!(versions(&loader.load(&registrar).unwrap()), vec![1]);

        let loader = MigrationLoader::new(LoaderFilter::new().namespace("app::core", true));
        assert_eq!(versions(&loader.load(&registrar).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_nothing_found_is_not_fatal() {
        let loader = MigrationLoader::new(LoaderFilter::new().namespace("missing", false));
        let err = loader.load(&registrar()).unwrap_err();

        assert!(matches!(err, MigrateError::NoMigrationsFound { .. }));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("namespace 'missing'"));
    }

    #[test]
    fn test_include() {
        fn billing(registrar: &mut MigrationRegistrar) {
            registrar.register(info(10, "Invoices"));
        }

        let mut registrar = MigrationRegistrar::new();
        registrar.include(billing).register(info(11, "Payments"));
        assert_eq!(registrar.len(), 2);
    }

    #[test]
    fn test_filter_from_json() {
        let filter: LoaderFilter =
            serde_json::from_str(r#"{"tags": ["TenantA"], "tag_match": "all"}"#).unwrap();
        assert_eq!(filter.tag_match, TagMatch::All);
        assert!(filter.namespace.is_none());
    }
}

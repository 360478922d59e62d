//! In-memory host collaborators.
//!
//! Used by the test suites and by embedders that want a dry run: nothing here
//! touches the filesystem.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;

use super::{Authorizer, OptionStore, PackageInfo, PackageKind, PackageManager, StatementExecutor};

/// A fixed set of granted capabilities.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    granted: HashSet<String>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every capability the built-ins query.
    pub fn all() -> Self {
        Self::from_names(super::capabilities::ALL.iter().copied())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn without(mut self, capability: &str) -> Self {
        self.granted.remove(capability);
        self
    }
}

impl Authorizer for Capabilities {
    fn can(&self, capability: &str) -> bool {
        self.granted.contains(capability)
    }
}

/// Option store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryOptions {
    values: Mutex<BTreeMap<String, Value>>,
    read_only: HashSet<String>,
}

impl MemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(self, key: impl Into<String>, value: Value) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.into(), value);
        }
        self
    }

    /// Writes to `key` are declined (the store returns `false`).
    pub fn read_only(mut self, key: impl Into<String>) -> Self {
        self.read_only.insert(key.into());
        self
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl OptionStore for MemoryOptions {
    fn get_option(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn update_option(&self, key: &str, value: Value) -> Result<bool> {
        if self.read_only.contains(key) {
            return Ok(false);
        }
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("option store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(true)
    }
}

/// Package manager that only keeps bookkeeping.
#[derive(Debug, Default)]
pub struct MemoryPackages {
    packages: Mutex<Vec<(PackageKind, PackageInfo)>>,
}

impl MemoryPackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, kind: PackageKind, slug: impl Into<String>, active: bool) -> Self {
        if let Ok(mut packages) = self.packages.lock() {
            packages.push((
                kind,
                PackageInfo {
                    slug: slug.into(),
                    active,
                },
            ));
        }
        self
    }

    pub fn is_active(&self, kind: PackageKind, slug: &str) -> bool {
        self.find(kind, slug)
            .ok()
            .flatten()
            .is_some_and(|p| p.active)
    }
}

impl PackageManager for MemoryPackages {
    fn installed(&self, kind: PackageKind) -> Result<Vec<PackageInfo>> {
        let packages = self
            .packages
            .lock()
            .map_err(|_| anyhow!("package list lock poisoned"))?;
        Ok(packages
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn install(&self, kind: PackageKind, slug: &str, _source: &Path) -> Result<()> {
        let mut packages = self
            .packages
            .lock()
            .map_err(|_| anyhow!("package list lock poisoned"))?;
        if !packages.iter().any(|(k, p)| *k == kind && p.slug == slug) {
            packages.push((
                kind,
                PackageInfo {
                    slug: slug.to_string(),
                    active: false,
                },
            ));
        }
        Ok(())
    }

    fn activate(&self, kind: PackageKind, slug: &str) -> Result<()> {
        let mut packages = self
            .packages
            .lock()
            .map_err(|_| anyhow!("package list lock poisoned"))?;
        if !packages.iter().any(|(k, p)| *k == kind && p.slug == slug) {
            bail!("{} '{}' is not installed", kind, slug);
        }
        // Only one theme can be active at a time.
        for (k, p) in packages.iter_mut().filter(|(k, _)| *k == kind) {
            if p.slug == slug {
                p.active = true;
            } else if *k == PackageKind::Theme {
                p.active = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    in_transaction: bool,
    pending: Vec<String>,
    committed: Vec<String>,
    transactions: usize,
    rollbacks: usize,
}

/// Statement executor that records what it was asked to run.
///
/// Committed statements are kept in order; `fail_with` makes every
/// subsequent `execute` report a driver error.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<DatabaseState>,
    failure: Option<String>,
    affected_rows: u64,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            affected_rows: 1,
            ..Self::default()
        }
    }

    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }

    pub fn committed(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.committed.clone())
            .unwrap_or_default()
    }

    /// Number of transactions begun.
    pub fn transactions(&self) -> usize {
        self.state.lock().map(|s| s.transactions).unwrap_or(0)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().map(|s| s.rollbacks).unwrap_or(0)
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, DatabaseState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("database state lock poisoned"))
    }
}

impl StatementExecutor for MemoryDatabase {
    fn begin(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.in_transaction {
            bail!("transaction already open");
        }
        state.in_transaction = true;
        state.transactions += 1;
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        let mut state = self.state()?;
        if let Some(ref message) = self.failure {
            bail!("{}", message);
        }
        state.pending.push(sql.to_string());
        Ok(self.affected_rows)
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state()?;
        if !state.in_transaction {
            bail!("no open transaction");
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state()?;
        state.pending.clear();
        state.in_transaction = false;
        state.rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::all().without("edit_users");
        assert!(caps.can("manage_options"));
        assert!(!caps.can("edit_users"));
        assert!(!caps.can_all(&["manage_options", "edit_users"]));
        assert!(!Capabilities::none().can("manage_options"));
    }

    #[test]
    fn test_options_read_only_declines() {
        let options = MemoryOptions::new()
            .with_option("blogname", json!("Old"))
            .read_only("siteurl");

        assert!(options.update_option("blogname", json!("New")).unwrap());
        assert!(!options.update_option("siteurl", json!("x")).unwrap());
        assert_eq!(options.get_option("blogname"), Some(json!("New")));
        assert_eq!(options.get_option("siteurl"), None);
    }

    #[test]
    fn test_theme_activation_is_exclusive() {
        let packages = MemoryPackages::new()
            .with_package(PackageKind::Theme, "old", true)
            .with_package(PackageKind::Theme, "new", false);

        packages.activate(PackageKind::Theme, "new").unwrap();
        assert!(packages.is_active(PackageKind::Theme, "new"));
        assert!(!packages.is_active(PackageKind::Theme, "old"));
    }

    #[test]
    fn test_activate_missing_package_fails() {
        let packages = MemoryPackages::new();
        assert!(packages.activate(PackageKind::Plugin, "ghost").is_err());
    }

    #[test]
    fn test_database_commit_and_rollback() {
        let db = MemoryDatabase::new();
        db.begin().unwrap();
        db.execute("UPDATE a SET b = 1").unwrap();
        db.commit().unwrap();

        db.begin().unwrap();
        db.execute("UPDATE a SET b = 2").unwrap();
        db.rollback().unwrap();

        assert_eq!(db.committed(), vec!["UPDATE a SET b = 1"]);
        assert_eq!(db.transactions(), 2);
        assert_eq!(db.rollbacks(), 1);
    }

    #[test]
    fn test_database_failure() {
        let db = MemoryDatabase::new().fail_with("Deadlock found");
        db.begin().unwrap();
        let err = db.execute("UPDATE a SET b = 1").unwrap_err();
        assert_eq!(err.to_string(), "Deadlock found");
    }
}

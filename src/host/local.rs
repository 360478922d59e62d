//! Directory-backed site used by the CLI.
//!
//! Layout:
//! ```text
//! <root>/site.json        options, installed plugins and themes
//! <root>/plugins/<slug>/  copied plugin packages
//! <root>/themes/<slug>/   copied theme packages
//! <root>/journal.sql      statements from committed SQL steps
//! ```
//! The journal only records statements; it cannot know affected row counts
//! and reports zero.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{OptionStore, PackageInfo, PackageKind, PackageManager, StatementExecutor};

const STATE_FILE: &str = "site.json";
const JOURNAL_FILE: &str = "journal.sql";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SiteState {
    #[serde(default)]
    options: BTreeMap<String, Value>,
    #[serde(default)]
    plugins: Vec<PackageInfo>,
    #[serde(default)]
    themes: Vec<PackageInfo>,
}

impl SiteState {
    fn packages_mut(&mut self, kind: PackageKind) -> &mut Vec<PackageInfo> {
        match kind {
            PackageKind::Plugin => &mut self.plugins,
            PackageKind::Theme => &mut self.themes,
        }
    }

    fn packages(&self, kind: PackageKind) -> &[PackageInfo] {
        match kind {
            PackageKind::Plugin => &self.plugins,
            PackageKind::Theme => &self.themes,
        }
    }
}

/// A site stored in a local directory.
#[derive(Debug)]
pub struct LocalSite {
    root: PathBuf,
    state: Mutex<SiteState>,
    transaction: Mutex<Option<Vec<String>>>,
}

impl LocalSite {
    /// Open (or create) the site rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create site directory {:?}", root))?;

        let state_path = root.join(STATE_FILE);
        let state = if state_path.exists() {
            let content = fs::read_to_string(&state_path)
                .with_context(|| format!("Failed to read site state from {:?}", state_path))?;
            serde_json::from_str(&content).context("Failed to parse site state JSON")?
        } else {
            SiteState::default()
        };

        Ok(Self {
            root,
            state: Mutex::new(state),
            transaction: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SiteState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("site state lock poisoned"))
    }

    fn lock_transaction(&self) -> Result<MutexGuard<'_, Option<Vec<String>>>> {
        self.transaction
            .lock()
            .map_err(|_| anyhow!("transaction lock poisoned"))
    }

    fn save(&self, state: &SiteState) -> Result<()> {
        let path = self.root.join(STATE_FILE);
        let json = serde_json::to_string_pretty(state)
            .context("Failed to serialize site state to JSON")?;
        fs::write(&path, json).with_context(|| format!("Failed to write site state to {:?}", path))
    }
}

impl OptionStore for LocalSite {
    fn get_option(&self, key: &str) -> Option<Value> {
        self.state.lock().ok()?.options.get(key).cloned()
    }

    fn update_option(&self, key: &str, value: Value) -> Result<bool> {
        let mut state = self.lock_state()?;
        state.options.insert(key.to_string(), value);
        self.save(&state)?;
        Ok(true)
    }
}

impl PackageManager for LocalSite {
    fn installed(&self, kind: PackageKind) -> Result<Vec<PackageInfo>> {
        Ok(self.lock_state()?.packages(kind).to_vec())
    }

    fn install(&self, kind: PackageKind, slug: &str, source: &Path) -> Result<()> {
        let target = self.root.join(format!("{}s", kind)).join(slug);
        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create package directory {:?}", target))?;
        if source.is_file() {
            let file_name = source
                .file_name()
                .ok_or_else(|| anyhow!("package source {:?} has no file name", source))?;
            fs::copy(source, target.join(file_name))
                .with_context(|| format!("Failed to copy package from {:?}", source))?;
        }

        let mut state = self.lock_state()?;
        let packages = state.packages_mut(kind);
        if !packages.iter().any(|p| p.slug == slug) {
            packages.push(PackageInfo {
                slug: slug.to_string(),
                active: false,
            });
        }
        self.save(&state)
    }

    fn activate(&self, kind: PackageKind, slug: &str) -> Result<()> {
        let mut state = self.lock_state()?;
        let packages = state.packages_mut(kind);
        if !packages.iter().any(|p| p.slug == slug) {
            bail!("{} '{}' is not installed", kind, slug);
        }
        for package in packages.iter_mut() {
            if package.slug == slug {
                package.active = true;
            } else if kind == PackageKind::Theme {
                package.active = false;
            }
        }
        self.save(&state)
    }
}

impl StatementExecutor for LocalSite {
    fn begin(&self) -> Result<()> {
        let mut transaction = self.lock_transaction()?;
        if transaction.is_some() {
            bail!("transaction already open");
        }
        *transaction = Some(Vec::new());
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        let mut transaction = self.lock_transaction()?;
        let pending = transaction
            .as_mut()
            .ok_or_else(|| anyhow!("statement executed outside a transaction"))?;
        pending.push(sql.trim().trim_end_matches(';').to_string());
        Ok(0)
    }

    fn commit(&self) -> Result<()> {
        let mut transaction = self.lock_transaction()?;
        let pending = transaction
            .take()
            .ok_or_else(|| anyhow!("no open transaction"))?;

        let path = self.journal_path();
        let mut journal = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal {:?}", path))?;
        for statement in pending {
            writeln!(journal, "{};", statement)
                .with_context(|| format!("Failed to append to journal {:?}", path))?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.lock_transaction()?.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_options_persist_across_open() {
        let dir = tempdir().unwrap();
        {
            let site = LocalSite::open(dir.path()).unwrap();
            site.update_option("blogname", json!("Shop")).unwrap();
        }
        let site = LocalSite::open(dir.path()).unwrap();
        assert_eq!(site.get_option("blogname"), Some(json!("Shop")));
    }

    #[test]
    fn test_install_copies_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("hello.zip");
        fs::write(&archive, b"zip").unwrap();

        let site = LocalSite::open(dir.path().join("site")).unwrap();
        site.install(PackageKind::Plugin, "hello", &archive).unwrap();
        site.activate(PackageKind::Plugin, "hello").unwrap();

        assert!(site.root().join("plugins/hello/hello.zip").exists());
        let plugins = site.installed(PackageKind::Plugin).unwrap();
        assert_eq!(plugins.len(), 1);
        assert!(plugins[0].active);
    }

    #[test]
    fn test_journal_only_keeps_committed() {
        let dir = tempdir().unwrap();
        let site = LocalSite::open(dir.path()).unwrap();

        site.begin().unwrap();
        site.execute("UPDATE wp_posts SET post_status='draft';").unwrap();
        site.commit().unwrap();

        site.begin().unwrap();
        site.execute("UPDATE wp_posts SET post_status='trash'").unwrap();
        site.rollback().unwrap();

        let journal = fs::read_to_string(site.journal_path()).unwrap();
        assert_eq!(journal, "UPDATE wp_posts SET post_status='draft';\n");
    }

    #[test]
    fn test_execute_requires_transaction() {
        let dir = tempdir().unwrap();
        let site = LocalSite::open(dir.path()).unwrap();
        assert!(site.execute("UPDATE a SET b=1").is_err());
    }
}

//! Host collaborators.
//!
//! The engine never talks to the hosting application directly. Everything it
//! needs (authorization, option storage, package installation, statement
//! execution, resource fetching) comes through the narrow traits below and is
//! bundled into a `Host` that both pipelines receive at construction.

pub mod local;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::storage::StorageRegistry;

pub use local::LocalSite;
pub use memory::{Capabilities, MemoryDatabase, MemoryOptions, MemoryPackages};

/// Capability names queried by the built-in exporters and processors.
pub mod capabilities {
    pub const MANAGE_OPTIONS: &str = "manage_options";
    pub const INSTALL_PLUGINS: &str = "install_plugins";
    pub const ACTIVATE_PLUGINS: &str = "activate_plugins";
    pub const INSTALL_THEMES: &str = "install_themes";
    pub const SWITCH_THEMES: &str = "switch_themes";
    pub const EDIT_POSTS: &str = "edit_posts";
    pub const EDIT_USERS: &str = "edit_users";

    /// Every capability the built-ins know about.
    pub const ALL: &[&str] = &[
        MANAGE_OPTIONS,
        INSTALL_PLUGINS,
        ACTIVATE_PLUGINS,
        INSTALL_THEMES,
        SWITCH_THEMES,
        EDIT_POSTS,
        EDIT_USERS,
    ];
}

/// Answers capability questions for the acting user.
pub trait Authorizer: Send + Sync {
    fn can(&self, capability: &str) -> bool;

    /// True when every capability in `required` is held.
    fn can_all(&self, required: &[&str]) -> bool {
        required.iter().all(|c| self.can(c))
    }
}

/// Key-value site options.
pub trait OptionStore: Send + Sync {
    fn get_option(&self, key: &str) -> Option<Value>;

    /// Returns `false` when the store declined the write.
    fn update_option(&self, key: &str, value: Value) -> Result<bool>;
}

/// Kind of installable package.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageKind {
    Plugin,
    Theme,
}

impl PackageKind {
    /// Resource type used when an exported step does not name one.
    pub const fn default_resource(self) -> &'static str {
        match self {
            Self::Plugin => "wordpress.org/plugins",
            Self::Theme => "wordpress.org/themes",
        }
    }
}

/// An installed plugin or theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub slug: String,
    #[serde(default)]
    pub active: bool,
}

/// Plugin/theme installation primitives.
pub trait PackageManager: Send + Sync {
    fn installed(&self, kind: PackageKind) -> Result<Vec<PackageInfo>>;

    /// Install from a fetched archive or directory.
    fn install(&self, kind: PackageKind, slug: &str, source: &Path) -> Result<()>;

    fn activate(&self, kind: PackageKind, slug: &str) -> Result<()>;

    fn find(&self, kind: PackageKind, slug: &str) -> Result<Option<PackageInfo>> {
        Ok(self.installed(kind)?.into_iter().find(|p| p.slug == slug))
    }
}

/// Raw statement execution with explicit transaction control.
pub trait StatementExecutor: Send + Sync {
    fn begin(&self) -> Result<()>;

    /// Execute one statement and return the affected row count.
    fn execute(&self, sql: &str) -> Result<u64>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// Everything a pipeline needs from the hosting application.
#[derive(Clone)]
pub struct Host {
    pub actor: Arc<dyn Authorizer>,
    pub options: Arc<dyn OptionStore>,
    pub packages: Arc<dyn PackageManager>,
    pub database: Arc<dyn StatementExecutor>,
    pub storage: Arc<StorageRegistry>,
}

impl Host {
    pub fn new(
        actor: Arc<dyn Authorizer>,
        options: Arc<dyn OptionStore>,
        packages: Arc<dyn PackageManager>,
        database: Arc<dyn StatementExecutor>,
        storage: Arc<StorageRegistry>,
    ) -> Self {
        Self {
            actor,
            options,
            packages,
            database,
            storage,
        }
    }

    /// Same host, different acting user.
    pub fn with_actor(&self, actor: Arc<dyn Authorizer>) -> Self {
        Self {
            actor,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

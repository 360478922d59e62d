//! Resource storage registry.
//!
//! Maps a resource type (e.g. `wordpress.org/plugins`) to an ordered list of
//! fetchers. Downloads try each fetcher in registration order and the first
//! one that produces a path wins. There is no caching and no retry; a type
//! with no successful fetcher simply yields `None`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Fetches a resource by slug and returns a local path to it.
pub trait ResourceFetcher: Send + Sync {
    fn download(&self, slug: &str) -> Option<PathBuf>;
}

impl<F> ResourceFetcher for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn download(&self, slug: &str) -> Option<PathBuf> {
        self(slug)
    }
}

/// Resolves slugs against a local directory of packages.
///
/// Looks for `<root>/<slug>.zip` first, then a `<root>/<slug>` directory.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ResourceFetcher for DirectoryFetcher {
    fn download(&self, slug: &str) -> Option<PathBuf> {
        // Slugs never contain path separators.
        if slug.is_empty() || slug.contains(['/', '\\']) || slug.starts_with('.') {
            return None;
        }
        let archive = self.root.join(format!("{}.zip", slug));
        if archive.is_file() {
            return Some(archive);
        }
        let dir = self.root.join(slug);
        dir.is_dir().then_some(dir)
    }
}

/// Registry of fetchers keyed by resource type.
#[derive(Default)]
pub struct StorageRegistry {
    storages: HashMap<String, Vec<Box<dyn ResourceFetcher>>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fetcher for `resource_type`. Earlier registrations are tried first.
    pub fn add_storage(
        &mut self,
        resource_type: impl Into<String>,
        fetcher: impl ResourceFetcher + 'static,
    ) {
        self.storages
            .entry(resource_type.into())
            .or_default()
            .push(Box::new(fetcher));
    }

    /// Builder form of `add_storage`.
    pub fn with_storage(
        mut self,
        resource_type: impl Into<String>,
        fetcher: impl ResourceFetcher + 'static,
    ) -> Self {
        self.add_storage(resource_type, fetcher);
        self
    }

    pub fn is_supported(&self, resource_type: &str) -> bool {
        self.storages
            .get(resource_type)
            .is_some_and(|fetchers| !fetchers.is_empty())
    }

    /// First non-empty result across the fetchers for `resource_type`.
    pub fn download(&self, slug: &str, resource_type: &str) -> Option<PathBuf> {
        let fetchers = self.storages.get(resource_type)?;
        for (index, fetcher) in fetchers.iter().enumerate() {
            match fetcher.download(slug) {
                Some(path) if !path.as_os_str().is_empty() => return Some(path),
                _ => debug!(
                    "Fetcher {} for {} produced nothing for '{}'",
                    index, resource_type, slug
                ),
            }
        }
        None
    }

    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.storages.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_unknown_type_is_unsupported() {
        let registry = StorageRegistry::new();
        assert!(!registry.is_supported("wordpress.org/plugins"));
        assert_eq!(registry.download("woocommerce", "wordpress.org/plugins"), None);
    }

    #[test]
    fn test_first_success_wins() {
        let registry = StorageRegistry::new()
            .with_storage("wordpress.org/plugins", |_: &str| -> Option<PathBuf> { None })
            .with_storage("wordpress.org/plugins", |slug: &str| -> Option<PathBuf> {
                Some(PathBuf::from(format!("/tmp/{}.zip", slug)))
            })
            .with_storage("wordpress.org/plugins", |_: &str| -> Option<PathBuf> {
                Some(PathBuf::from("/never/used.zip"))
            });

        assert_eq!(
            registry.download("hello", "wordpress.org/plugins"),
            Some(PathBuf::from("/tmp/hello.zip"))
        );
    }

    #[test]
    fn test_all_empty_yields_none() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b) = (calls.clone(), calls.clone());
        let registry = StorageRegistry::new()
            .with_storage("t", move |_: &str| -> Option<PathBuf> {
                a.fetch_add(1, Ordering::SeqCst);
                None
            })
            .with_storage("t", move |_: &str| -> Option<PathBuf> {
                b.fetch_add(1, Ordering::SeqCst);
                Some(PathBuf::new())
            });

        assert_eq!(registry.download("x", "t"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_directory_fetcher() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.zip"), b"zip").unwrap();
        std::fs::create_dir(dir.path().join("storefront")).unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        assert_eq!(fetcher.download("hello"), Some(dir.path().join("hello.zip")));
        assert_eq!(fetcher.download("storefront"), Some(dir.path().join("storefront")));
        assert_eq!(fetcher.download("missing"), None);
        assert_eq!(fetcher.download("../etc"), None);
    }
}

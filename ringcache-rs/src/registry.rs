//! Keeps track of all namespaces of a node.
//!
//! The registry is owned by the [Node](crate::node::Node) and used by the
//! [server](crate::server) to resolve the namespace of an incoming peer request. Each name can
//! only be used once. Creating a namespace takes a write lock, lookups only share a read lock.
//!
//! # Examples
//! ```
//! # use ringcache::registry::Registry;
//! let registry = Registry::new();
//! let scores = registry
//!     .create("scores", 1024, |key: String| async move { Ok(key.into_bytes()) })
//!     .unwrap();
//!
//! assert_eq!(registry.get("scores").unwrap().name(), scores.name());
//! assert!(registry.get("unknown").is_none());
//!
//! // Names are unique...
//! assert!(registry
//!     .create("scores", 1024, |_: String| async { Ok(Vec::new()) })
//!     .is_err());
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::error::{CacheError, Result};
use crate::namespace::{Namespace, NamespaceStats};

/// Maps names to namespaces.
#[derive(Default)]
pub struct Registry {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry {
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Creates and registers a new namespace.
    ///
    /// Returns a **Config** error if a namespace with the given name already exists.
    pub fn create<F, Fut>(
        &self,
        name: &str,
        max_memory: usize,
        loader: F,
    ) -> Result<Arc<Namespace>>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        let mut namespaces = self.namespaces.write().unwrap();
        if namespaces.contains_key(name) {
            return Err(CacheError::Config(format!(
                "A namespace named '{}' already exists.",
                name
            )));
        }

        let namespace = Arc::new(Namespace::new(name, max_memory, loader));
        let _ = namespaces.insert(name.to_owned(), namespace.clone());
        log::info!("Created namespace {}.", name);

        Ok(namespace)
    }

    /// Returns the namespace with the given name.
    pub fn get(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.read().unwrap().get(name).cloned()
    }

    /// Resolves the namespace with the given name or reports a **NamespaceNotFound** error.
    pub fn require(&self, name: &str) -> Result<Arc<Namespace>> {
        self.get(name)
            .ok_or_else(|| CacheError::NamespaceNotFound(name.to_owned()))
    }

    /// Lists the names of all namespaces in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().unwrap().keys().cloned().collect();
        names.sort();

        names
    }

    /// Returns the statistics of all namespaces, ordered by name.
    pub fn stats(&self) -> Vec<NamespaceStats> {
        let mut stats: Vec<NamespaceStats> = self
            .namespaces
            .read()
            .unwrap()
            .values()
            .map(|namespace| namespace.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));

        stats
    }

    /// Returns the number of namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.read().unwrap().len()
    }

    /// Determines if there are no namespaces at all.
    pub fn is_empty(&self) -> bool {
        self.namespaces.read().unwrap().is_empty()
    }

    /// Drops all namespaces.
    ///
    /// Namespaces which are still in use elsewhere remain functional, but can no longer be
    /// resolved via this registry.
    pub fn clear(&self) {
        self.namespaces.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CacheError;
    use crate::registry::Registry;
    use crate::testing::test_async;

    fn echo(key: String) -> impl std::future::Future<Output = anyhow::Result<Vec<u8>>> {
        async move { Ok(key.into_bytes()) }
    }

    #[test]
    fn namespaces_are_created_once() {
        let registry = Registry::new();
        assert!(registry.create("scores", 0, echo).is_ok());

        match registry.create("scores", 0, echo) {
            Err(CacheError::Config(_)) => (),
            _ => panic!("A duplicate namespace must be rejected!"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_namespaces_are_reported() {
        let registry = Registry::new();
        match registry.require("scores") {
            Err(CacheError::NamespaceNotFound(name)) => assert_eq!(name, "scores"),
            _ => panic!("An unknown namespace must be reported!"),
        }
    }

    #[test]
    fn registered_namespaces_can_be_used() {
        test_async(async {
            let registry = Registry::new();
            let _ = registry.create("users", 0, echo).unwrap();
            let _ = registry.create("scores", 0, echo).unwrap();

            assert_eq!(registry.names(), vec!["scores", "users"]);
            assert_eq!(
                registry
                    .require("users")
                    .unwrap()
                    .get("Tom")
                    .await
                    .unwrap()
                    .to_string(),
                "Tom"
            );
            assert_eq!(registry.stats()[1].entries, 1);

            registry.clear();
            assert!(registry.is_empty());
            assert!(registry.get("users").is_none());
        });
    }
}

//! Represents a single process which takes part in a cache cluster.
//!
//! A node ties together the [Config], the [Registry] of its namespaces and the [HttpPool] which
//! knows about all other nodes. It also carries the "running" flag which is used to shut down
//! all background tasks (e.g. the [Server](crate::server::Server)).
//!
//! Nodes are most probably created by a [Builder](crate::builder::Builder).
//!
//! # Examples
//! ```
//! # use ringcache::builder::Builder;
//! # #[tokio::main]
//! # async fn main() {
//! let node = Builder::new().build().await;
//! node.config().load_from_string("
//! namespaces:
//!     scores:
//!         max_memory: 2k
//! ", None).unwrap();
//!
//! let scores = node
//!     .create_namespace("scores", |key: String| async move { Ok(key.into_bytes()) })
//!     .unwrap();
//! assert_eq!(scores.stats().max_memory, 2048);
//!
//! node.terminate();
//! assert!(!node.is_running());
//! assert!(node.registry().is_empty());
//! # }
//! ```
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use yaml_rust::Yaml;

use crate::config::Config;
use crate::error::Result;
use crate::fmt::parse_size;
use crate::namespace::Namespace;
use crate::pool::{HttpPool, DEFAULT_BASE_PATH, DEFAULT_REPLICAS};
use crate::registry::Registry;

/// Contains the memory budget of a namespace which has no **max_memory** setting.
pub const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;

/// Contains the port used if no **server.port** is configured.
pub const DEFAULT_PORT: u16 = 8001;

/// Determines how often a background task checks if the node is still running.
const RUNNING_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Represents a node of a cache cluster.
pub struct Node {
    running: AtomicBool,
    config: Config,
    registry: Registry,
    pool: Arc<HttpPool>,
}

impl Node {
    /// Creates a new node based on the given config.
    ///
    /// The base path and the number of replicas of the peer pool are determined once here, all
    /// other settings are re-applied via [apply_config](Node::apply_config) whenever the config
    /// changes.
    pub fn new(config: Config) -> Arc<Self> {
        let handle = config.current();
        let settings = &handle.config()["peers"];

        let base_path =
            normalize_base_path(settings["base_path"].as_str().unwrap_or(DEFAULT_BASE_PATH));
        let replicas = settings["replicas"]
            .as_i64()
            .filter(|replicas| *replicas > 0)
            .map(|replicas| replicas as usize)
            .unwrap_or(DEFAULT_REPLICAS);
        let self_url = settings["self"]
            .as_str()
            .map(|url| url.to_owned())
            .unwrap_or_else(|| format!("http://localhost:{}", port(handle.config())));

        let pool = HttpPool::with_settings(self_url, &base_path, replicas);
        pool.apply_config(handle.config());

        Arc::new(Node {
            running: AtomicBool::new(true),
            config,
            registry: Registry::new(),
            pool: Arc::new(pool),
        })
    }

    /// Determines if the node is still active or if [terminate](Node::terminate) has been
    /// invoked.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Terminates the node.
    ///
    /// All background tasks will stop eventually and all namespaces are dropped from the
    /// registry.
    pub fn terminate(&self) {
        log::info!("Terminating node...");
        self.running.store(false, Ordering::Release);
        self.registry.clear();
    }

    /// Provides access to the config of this node.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provides access to the namespaces of this node.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Provides access to the peer pool of this node.
    pub fn pool(&self) -> &Arc<HttpPool> {
        &self.pool
    }

    /// Creates a namespace which is distributed across all peers of this node.
    ///
    /// The memory budget is read from **namespaces.<name>.max_memory** and kept up to date
    /// when the config changes.
    pub fn create_namespace<F, Fut>(&self, name: &str, loader: F) -> Result<Arc<Namespace>>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        let max_memory = max_memory(self.config.current().config(), name);
        let namespace = self.registry.create(name, max_memory, loader)?;
        namespace.register_peers(self.pool.clone());

        Ok(namespace)
    }

    /// Applies the current config to the peer pool and all namespaces.
    ///
    /// This is invoked automatically for each config change once the node has been built by a
    /// [Builder](crate::builder::Builder).
    pub fn apply_config(&self) {
        let handle = self.config.current();
        self.pool.apply_config(handle.config());

        for name in self.registry.names() {
            if let Some(namespace) = self.registry.get(&name) {
                namespace.set_max_memory(max_memory(handle.config(), &name));
            }
        }
    }
}

fn normalize_base_path(base_path: &str) -> String {
    let mut result = String::with_capacity(base_path.len() + 2);
    if !base_path.starts_with('/') {
        result.push('/');
    }
    result.push_str(base_path);
    if !base_path.ends_with('/') {
        result.push('/');
    }

    result
}

/// Determines the server port based on the given config.
pub(crate) fn port(config: &Yaml) -> u16 {
    config["server"]["port"]
        .as_i64()
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port > 0)
        .unwrap_or(DEFAULT_PORT)
}

fn max_memory(config: &Yaml, namespace: &str) -> usize {
    match &config["namespaces"][namespace]["max_memory"] {
        Yaml::Integer(value) if *value >= 0 => *value as usize,
        Yaml::String(value) => parse_size(value).unwrap_or_else(|error| {
            log::error!(
                "Invalid max_memory for namespace {}: {:#}. Using {} bytes.",
                namespace,
                error,
                DEFAULT_MAX_MEMORY
            );
            DEFAULT_MAX_MEMORY
        }),
        _ => DEFAULT_MAX_MEMORY,
    }
}

/// Applies each config change to the given node until it is terminated.
///
/// Note that this is called by the [Builder](crate::builder::Builder).
pub fn install_config_listener(node: Arc<Node>) {
    let mut notifier = node.config().notifier();
    crate::spawn!(async move {
        while node.is_running() {
            tokio::select! {
                change = notifier.recv() => match change {
                    Ok(_) | Err(RecvError::Lagged(_)) => node.apply_config(),
                    Err(RecvError::Closed) => return,
                },
                _ = tokio::time::sleep(RUNNING_CHECK_INTERVAL) => (),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::node::{install_config_listener, Node, DEFAULT_MAX_MEMORY};
    use crate::peers::PeerPicker;
    use crate::testing::test_async;
    use std::time::Duration;

    fn echo(key: String) -> impl std::future::Future<Output = anyhow::Result<Vec<u8>>> {
        async move { Ok(key.into_bytes()) }
    }

    #[test]
    fn pool_is_set_up_from_config() {
        let config = Config::new("test.yml");
        config
            .load_from_string(
                "
server:
    port: 8002
peers:
    base_path: _cache
    replicas: 7
    nodes:
        - http://localhost:8001
        - http://localhost:8002
        ",
                None,
            )
            .unwrap();

        let node = Node::new(config);
        assert_eq!(node.pool().base_path(), "/_cache/");
        assert_eq!(node.pool().replicas(), 7);
        assert_eq!(node.pool().self_url(), "http://localhost:8002");
        assert_eq!(node.pool().peers().len(), 2);
    }

    #[test]
    fn defaults_are_used_without_config() {
        let node = Node::new(Config::new("test.yml"));
        assert_eq!(node.pool().base_path(), "/_ringcache/");
        assert_eq!(node.pool().self_url(), "http://localhost:8001");
        assert!(node.pool().pick_peer("Tom").is_none());

        let namespace = node.create_namespace("scores", echo).unwrap();
        assert_eq!(namespace.stats().max_memory, DEFAULT_MAX_MEMORY);
        assert!(node.create_namespace("scores", echo).is_err());
    }

    #[test]
    fn config_changes_are_applied() {
        test_async(async {
            let node = Node::new(Config::new("test.yml"));
            let namespace = node.create_namespace("scores", echo).unwrap();
            install_config_listener(node.clone());

            node.config()
                .load_from_string(
                    "
peers:
    self: http://localhost:8001
    nodes:
        - http://localhost:8001
        - http://localhost:8002
namespaces:
    scores:
        max_memory: 16k
                ",
                    None,
                )
                .unwrap();

            // Give the listener a chance to pick up the change...
            let mut attempts = 0;
            while namespace.stats().max_memory != 16 * 1024 && attempts < 50 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                attempts += 1;
            }

            assert_eq!(namespace.stats().max_memory, 16 * 1024);
            assert_eq!(node.pool().peers().len(), 2);

            node.terminate();
        });
    }
}

//! Provides a builder which can be used to setup and initialize a cache node.
//!
//! Logging, signal handling and the config file are optional parts of a node. A builder
//! permits to selectively enable or disable them.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use ringcache::builder::Builder;
//! # use ringcache::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the node...
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Create namespaces here...
//!     node.create_namespace("scores", |key: String| async move { Ok(key.into_bytes()) })
//!         .unwrap();
//!
//!     // Start serving requests of other peers...
//!     Server::new(&node).event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::config::{Config, SETTINGS_FILE};
use crate::node::Node;
use crate::{init_logging, RINGCACHE_REVISION, RINGCACHE_VERSION};

/// Initializes the framework by creating and initializing all core components.
///
/// By default all components are disabled, so that tests and embedded usages stay silent and
/// don't touch the file system.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Builder {
            setup_logging: false,
            enable_signals: false,
            setup_config: false,
        }
    }

    /// Enables all features.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the node once CTRL-C or SIGHUP is received.
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables the signal listener.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Loads **config/settings.yml** and reloads it once it changes.
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Starts with an empty config which can still be filled via
    /// [Config::load_from_string](crate::config::Config::load_from_string).
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Builds the node based on the enabled features.
    pub async fn build(self) -> Arc<Node> {
        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. RINGCACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            RINGCACHE_VERSION,
            RINGCACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        let config = if self.setup_config {
            crate::config::load_settings().await
        } else {
            Config::new(SETTINGS_FILE)
        };

        let node = Node::new(config);
        crate::node::install_config_listener(node.clone());

        if self.enable_signals {
            crate::signals::install(node.clone());
        }

        if self.setup_config {
            crate::config::install(node.clone());
        }

        node
    }
}

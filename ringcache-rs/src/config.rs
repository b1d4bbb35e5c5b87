//! Contains the system configuration.
//!
//! Provides access to the system configuration which is loaded from the **config/settings.yml**
//! file. The file is observed for changes and reloaded once a change is detected. Therefore
//! each user of the config should attach itself to the [Config::notifier](Config::notifier) and
//! re-process the config once a change message is received. This way the peers of a node or
//! the memory budget of its namespaces can be changed without restarting the process.
//!
//! Note that the **Config** struct itself can be obtained from the [Node](crate::node::Node)
//! once and then kept around. However, a [Handle] obtained via **Config::current()** should not
//! be stored, as it will not be updated once a new config has been loaded.
//!
//! # Examples
//!
//! Obtaining and reading the config:
//! ```
//! # use ringcache::builder::Builder;
//! # #[tokio::main]
//! # async fn main() {
//! let node = Builder::new().build().await;
//! node.config().load_from_string("server:\n    port: 8002", None).unwrap();
//!
//! let port = node.config().current().query("server.port").as_i64().unwrap_or(8001);
//! assert_eq!(port, 8002);
//! # }
//! ```
//!
//! Attaching a change listener:
//! ```no_run
//! # use ringcache::builder::Builder;
//! # #[tokio::main]
//! # async fn main() {
//! let node = Builder::new().enable_config().build().await;
//! let mut notifier = node.config().notifier();
//! tokio::spawn(async move {
//!     loop {
//!         match notifier.recv().await {
//!             Ok(_) => log::info!("Config update received..."),
//!             _ => return,
//!         }
//!     }
//! });
//! # }
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use yaml_rust::yaml::Hash;
use yaml_rust::{Yaml, YamlLoader};

use crate::node::Node;

/// Contains the file which is loaded by [load_settings].
pub const SETTINGS_FILE: &str = "config/settings.yml";

/// Provides access to the system configuration.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The actual message being broadcast
/// can and should be ignored. All that matters is, once a message has been received, the config
/// was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it will not be updated
/// if the underlying config changed.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new and empty config which reads the given file.
    ///
    /// Note that this will neither load the file nor install a change listener. This is done
    /// by [load_settings] and [install].
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Hash(Hash::new()), None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// As within docker, the file is presented as volume, we check that it is a file, as an
    /// unmounted docker volume is always presented as directory.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Forces the config to read the underlying file.
    ///
    /// Note that this is normally called by the framework and should not be invoked manually.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if !metadata.is_file() => {
                log::info!("Config file is an unmounted docker volume - skipping config load.");
                return Ok(());
            }
            Err(_) => {
                log::info!("Config file doesn't exist - skipping config load.");
                return Ok(());
            }
            _ => (),
        }

        let config_data = match tokio::fs::read_to_string(&self.filename).await {
            Ok(data) => data,
            Err(error) => {
                return Err(anyhow::anyhow!(
                    "Cannot load config file {}: {}",
                    &self.filename,
                    error
                ));
            }
        };

        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// This is intended to be used in test environments where we cannot / do not want to load
    /// a config file from disk.
    ///
    /// # Example
    ///
    /// ```
    /// # use ringcache::config::Config;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("
    /// peers:
    ///     replicas: 10
    /// ", None).unwrap();
    ///
    /// assert_eq!(config.current().query("peers.replicas").as_i64().unwrap(), 10);
    /// assert!(config.current().query("peers.unknown").is_badvalue());
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = match YamlLoader::load_from_str(data) {
            Ok(docs) => docs,
            Err(error) => {
                return Err(anyhow::anyhow!(
                    "Cannot parse config file {}: {}",
                    &self.filename,
                    error
                ));
            }
        };

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Hash(Hash::new()),
        };

        // Store update config...
        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dotted path like "server.port" within the currently loaded configuration.
    ///
    /// Returns **Yaml::BadValue** if any of the path segments doesn't exist.
    pub fn query(&self, query: impl AsRef<str>) -> &Yaml {
        query
            .as_ref()
            .split('.')
            .fold(&self.config.0, |yaml, segment| &yaml[segment])
    }
}

/// Creates a **Config** for **config/settings.yml** and tries to load it.
///
/// A missing or broken file is logged and yields an empty config, so that a node still starts
/// up using its default settings.
///
/// Note that this method is called by the [Builder](crate::builder::Builder) unless the config
/// is disabled.
pub async fn load_settings() -> Config {
    let config = Config::new(SETTINGS_FILE);

    // Create the "config" directory in case it doesn't exist...
    if let Some(path) = Path::new(SETTINGS_FILE).parent() {
        if let Err(error) = tokio::fs::create_dir_all(path).await {
            log::warn!(
                "Failed to create config base directory {}: {}",
                path.to_string_lossy(),
                error
            )
        }
    }

    // Actually try to read the file...
    if let Err(error) = config.load().await {
        log::error!("{}", error);
    }

    config
}

/// Installs a change listener for the config file of the given node.
///
/// Note that this listener will only watch the "last modified" date of the file and will not
/// perform a structural comparison. Therefore it is the duty of each config user to gracefully
/// handle partial config changes.
pub fn install(node: Arc<Node>) {
    // Checks the file every 2s...
    run_config_change_monitor(node);
}

#[cfg(test)]
fn run_config_change_monitor(_node: Arc<Node>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(node: Arc<Node>) {
    crate::spawn!(async move {
        while node.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let config = node.config();

            // This will contain the last modified date of the file on disk or be None if the
            // file is absent...
            let last_modified = config.last_modified().await;

            // Contains the timestamp when the file was loaded the last time or be None if no
            // data has been loaded yet...
            let last_loaded = config.config.load().1;

            // If a file is present and newer that the one previously loaded (or if none has been
            // loaded so far) -> perform a reload and broadcast an update if the file has been
            // successfully loaded...
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => {
                        log::info!("System configuration was re-loaded.");
                    }
                    Err(error) => log::error!("Failed to re-load system config: {}", error),
                }
            }
        }
    });
}

//! Provides the read-through cache of a single namespace.
//!
//! A namespace combines a size constrained [LruCache], an optional [PeerPicker] and a user
//! supplied loader. A lookup runs through the following stages:
//!
//! 1. Empty keys are rejected right away.
//! 2. If the key is present in the local cache, its value is returned.
//! 3. Otherwise the key is loaded within a [flight](crate::flight) so that concurrent lookups
//!    of the same key only trigger a single load.
//! 4. If a peer owns the key, the value is fetched from there. Values fetched from a peer are
//!    not stored locally, as the peer is in charge of caching them.
//! 5. If there is no such peer, or if the peer fails, the loader is invoked and its result is
//!    stored in the local cache. Errors of the loader are never cached.
//!
//! # Examples
//! ```
//! # use ringcache::namespace::Namespace;
//! # #[tokio::main]
//! # async fn main() {
//! let scores = Namespace::new("scores", 2048, |key: String| async move {
//!     match key.as_str() {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} does not exist", key)),
//!     }
//! });
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(
//!     scores.get("Jerry").await.unwrap_err().to_string(),
//!     "Jerry does not exist"
//! );
//! # }
//! ```
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::byteview::ByteView;
use crate::error::{CacheError, Result};
use crate::flight::Group;
use crate::fmt::format_size;
use crate::lru::LruCache;
use crate::peers::{PeerGetter, PeerPicker};

/// Loads the value of a key from the underlying data source.
pub type Loader = Box<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> + Send + Sync>;

/// Represents a named, read-through cache.
pub struct Namespace {
    name: String,
    loader: Loader,
    cache: Mutex<LruCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flights: Group<Result<ByteView>>,
    local_loads: AtomicUsize,
    peer_loads: AtomicUsize,
    peer_failures: AtomicUsize,
}

/// Provides a snapshot of the statistics of a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceStats {
    /// Contains the name of the namespace.
    pub name: String,

    /// Contains the number of entries in the local cache.
    pub entries: usize,

    /// Contains the number of bytes occupied by keys and values.
    pub allocated_memory: usize,

    /// Contains the memory budget (0 means unbounded).
    pub max_memory: usize,

    /// Contains the percentage of local lookups which were hits.
    pub hit_rate: f32,

    /// Contains the number of values provided by the loader.
    pub local_loads: usize,

    /// Contains the number of values fetched from peers.
    pub peer_loads: usize,

    /// Contains the number of failed peer requests.
    pub peer_failures: usize,

    /// Contains the number of entries evicted from the local cache.
    pub evictions: usize,
}

impl std::fmt::Display for NamespaceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} entries, {} of {}, {:.1}% hits, {} local loads, {} peer loads ({} failed), {} evictions",
            self.name,
            self.entries,
            format_size(self.allocated_memory),
            if self.max_memory == 0 {
                "unlimited".to_owned()
            } else {
                format_size(self.max_memory)
            },
            self.hit_rate,
            self.local_loads,
            self.peer_loads,
            self.peer_failures,
            self.evictions
        )
    }
}

impl Namespace {
    /// Creates a new namespace which keeps up to **max_memory** bytes in its local cache.
    ///
    /// The given loader is invoked for each key which is neither cached locally nor owned by
    /// a peer.
    pub fn new<F, Fut>(name: impl Into<String>, max_memory: usize, loader: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        let name = name.into();
        let eviction_name = name.clone();
        let cache = LruCache::with_eviction_callback(
            max_memory,
            Box::new(move |key: &str, value: &ByteView| {
                log::debug!(
                    "Evicted '{}' ({}) from namespace {}.",
                    key,
                    format_size(value.len()),
                    eviction_name
                );
            }),
        );

        Namespace {
            name,
            loader: Box::new(move |key: String| loader(key).boxed()),
            cache: Mutex::new(cache),
            peers: OnceLock::new(),
            flights: Group::new(),
            local_loads: AtomicUsize::new(0),
            peer_loads: AtomicUsize::new(0),
            peer_failures: AtomicUsize::new(0),
        }
    }

    /// Returns the name of this namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the picker used to determine the owner of a key.
    ///
    /// # Panics
    /// Panics if a picker has already been registered for this namespace.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!("Peers have already been registered for namespace {}!", self.name);
        }
    }

    /// Fetches the value for the given key.
    ///
    /// Returns an **InvalidArgument** error for an empty key and a **Loader** error if the
    /// value had to be loaded and the loader failed.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("A key is required.".to_owned()));
        }

        if let Some(value) = self.lookup(key) {
            log::debug!("Cache hit for '{}' in namespace {}.", key, self.name);
            return Ok(value);
        }

        self.flights.work(key, self.load(key)).await
    }

    fn lookup(&self, key: &str) -> Option<ByteView> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let _ = self.peer_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Failed to fetch '{}' of namespace {} from peer: {:#}. Loading locally...",
                        key,
                        self.name,
                        error
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> anyhow::Result<ByteView> {
        let value = peer.get(&self.name, key).await?;
        let _ = self.peer_loads.fetch_add(1, Ordering::Relaxed);

        Ok(ByteView::new(value))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let value = (self.loader)(key.to_owned())
            .await
            .map(ByteView::new)
            .map_err(CacheError::loader)?;
        let _ = self.local_loads.fetch_add(1, Ordering::Relaxed);

        self.cache
            .lock()
            .unwrap()
            .put(key.to_owned(), value.clone());

        Ok(value)
    }

    /// Changes the memory budget of the local cache.
    ///
    /// Shrinking the budget evicts entries right away.
    pub fn set_max_memory(&self, max_memory: usize) {
        let mut cache = self.cache.lock().unwrap();
        if cache.max_memory() != max_memory {
            log::info!(
                "Updating max_memory of {} from {} to {}.",
                self.name,
                format_size(cache.max_memory()),
                format_size(max_memory)
            );
            cache.set_max_memory(max_memory);
        }
    }

    /// Returns a snapshot of the statistics of this namespace.
    pub fn stats(&self) -> NamespaceStats {
        let cache = self.cache.lock().unwrap();
        NamespaceStats {
            name: self.name.clone(),
            entries: cache.len(),
            allocated_memory: cache.allocated_memory(),
            max_memory: cache.max_memory(),
            hit_rate: cache.hit_rate(),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_failures: self.peer_failures.load(Ordering::Relaxed),
            evictions: cache.evictions(),
        }
    }
}

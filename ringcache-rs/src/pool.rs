//! Provides the HTTP based peer pool.
//!
//! An [HttpPool] knows the address of the local node ("self") and the addresses of all nodes
//! of the cluster. It places these onto a [HashRing] to determine the owner of each key and
//! keeps one [HttpGetter] per node to fetch values from there.
//!
//! The pool follows the configuration of its node:
//! ```yaml
//! peers:
//!     self: http://10.0.0.1:8001
//!     nodes:
//!         - http://10.0.0.1:8001
//!         - http://10.0.0.2:8001
//! ```
//! Whenever these settings change, the ring is rebuilt as a whole.
//!
//! # Examples
//! ```
//! # use ringcache::pool::HttpPool;
//! # use ringcache::peers::PeerPicker;
//! let pool = HttpPool::new("http://localhost:8001");
//!
//! // Without any peers, everything is handled locally...
//! assert!(pool.pick_peer("Tom").is_none());
//!
//! // If we are the only node, we still own every key...
//! pool.set(["http://localhost:8001"]);
//! assert!(pool.pick_peer("Tom").is_none());
//! ```
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use hyper_tls::HttpsConnector;
use yaml_rust::Yaml;

use crate::consistenthash::HashRing;
use crate::peers::{PeerGetter, PeerPicker};
use crate::wire::{decode_value, peer_url};

/// Contains the path prefix under which nodes serve peer requests.
pub const DEFAULT_BASE_PATH: &str = "/_ringcache/";

/// Contains the number of virtual nodes per node on the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

/// Fetches values from a single peer via HTTP(S).
pub struct HttpGetter {
    base_url: String,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpGetter {
    /// Creates a getter which talks to the peer reachable via the given base URL.
    ///
    /// The base URL is the address of the peer followed by its base path, e.g.
    /// `http://10.0.0.2:8001/_ringcache/`.
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpGetter::with_client(base_url, Client::builder().build(HttpsConnector::new()))
    }

    fn with_client(
        base_url: impl Into<String>,
        client: Client<HttpsConnector<HttpConnector>, Body>,
    ) -> Self {
        HttpGetter {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL of the peer.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let url = peer_url(&self.base_url, namespace, key);
        let uri = Uri::from_str(&url).with_context(|| format!("Invalid peer url: {}", url))?;

        let response = self
            .client
            .get(uri)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Peer returned {} for {}",
                response.status(),
                url
            ));
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .with_context(|| format!("Failed to read response body of {}", url))?;

        decode_value(&body).with_context(|| format!("Failed to decode response body of {}", url))
    }
}

struct PoolState {
    self_url: String,
    ring: HashRing,
    getters: HashMap<String, Arc<dyn PeerGetter>>,
}

/// Picks peers via consistent hashing and fetches values from them via HTTP.
pub struct HttpPool {
    base_path: String,
    replicas: usize,
    client: Client<HttpsConnector<HttpConnector>, Body>,
    state: Mutex<PoolState>,
}

impl HttpPool {
    /// Creates a pool for the node reachable via the given URL, using the default base path and
    /// number of replicas.
    pub fn new(self_url: impl Into<String>) -> Self {
        HttpPool::with_settings(self_url, DEFAULT_BASE_PATH, DEFAULT_REPLICAS)
    }

    /// Creates a pool with a custom base path and number of virtual nodes per peer.
    pub fn with_settings(self_url: impl Into<String>, base_path: &str, replicas: usize) -> Self {
        HttpPool {
            base_path: base_path.to_owned(),
            replicas,
            client: Client::builder().build(HttpsConnector::new()),
            state: Mutex::new(PoolState {
                self_url: self_url.into(),
                ring: HashRing::new(replicas),
                getters: HashMap::new(),
            }),
        }
    }

    /// Returns the path prefix under which peer requests are served.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns the number of virtual nodes per peer.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns the URL under which the local node is known to its peers.
    pub fn self_url(&self) -> String {
        self.state.lock().unwrap().self_url.clone()
    }

    /// Changes the URL under which the local node is known to its peers.
    pub fn set_self(&self, self_url: impl Into<String>) {
        self.state.lock().unwrap().self_url = self_url.into();
    }

    /// Replaces the set of peers.
    ///
    /// The list should contain the local node as well, so that all nodes compute the same ring.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers: Vec<String> = peers
            .into_iter()
            .map(|peer| peer.as_ref().to_owned())
            .collect();

        let mut ring = HashRing::new(self.replicas);
        ring.add(&peers);

        let mut getters: HashMap<String, Arc<dyn PeerGetter>> = HashMap::new();
        for peer in &peers {
            let _ = getters.insert(
                peer.clone(),
                Arc::new(HttpGetter::with_client(
                    format!("{}{}", peer, self.base_path),
                    self.client.clone(),
                )),
            );
        }

        let mut state = self.state.lock().unwrap();
        state.ring = ring;
        state.getters = getters;
        log::info!("Peers have been set to: {}", peers.join(", "));
    }

    /// Lists all known peers (including the local node) in alphabetical order.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.state.lock().unwrap().getters.keys().cloned().collect();
        peers.sort();

        peers
    }

    /// Determines if the local node is part of the peer list.
    ///
    /// Peers are matched by their exact URL. If the local node is listed under another name
    /// (e.g. **127.0.0.1** instead of **localhost**), it would send requests for its own keys to
    /// itself.
    pub fn is_self_listed(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.getters.is_empty() || state.getters.contains_key(&state.self_url)
    }

    /// Applies the **peers** section of the given configuration.
    ///
    /// Missing settings leave the current state untouched, the peer list is only replaced if it
    /// actually changed.
    pub fn apply_config(&self, config: &Yaml) {
        let settings = &config["peers"];

        if let Some(self_url) = settings["self"].as_str() {
            if self.self_url() != self_url {
                log::info!("Updating self of peer pool to {}.", self_url);
                self.set_self(self_url);
            }
        }

        if let Some(nodes) = settings["nodes"].as_vec() {
            let mut nodes: Vec<String> = nodes
                .iter()
                .filter_map(|node| node.as_str())
                .map(|node| node.to_owned())
                .collect();
            nodes.sort();
            nodes.dedup();

            if nodes != self.peers() {
                self.set(nodes);
            }
        }

        if !self.is_self_listed() {
            log::warn!(
                "{} is not among the configured peers ({}). Keys owned by it will be fetched via HTTP.",
                self.self_url(),
                self.peers().join(", ")
            );
        }
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.lock().unwrap();
        match state.ring.get(key) {
            Some(peer) if peer != state.self_url => {
                log::debug!("Picked peer {} for '{}'.", peer, key);
                state.getters.get(peer).cloned()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::peers::{PeerGetter, PeerPicker};
    use crate::pool::{HttpGetter, HttpPool};
    use crate::testing::test_async;
    use crate::wire::encode_value;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, StatusCode};
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use yaml_rust::YamlLoader;

    const SELF: &str = "http://localhost:8001";
    const OTHER: &str = "http://localhost:8002";

    #[test]
    fn peers_are_picked_except_for_ourself() {
        let pool = HttpPool::new(SELF);
        pool.set([SELF, OTHER]);

        let mut local = 0;
        let mut remote = 0;
        for i in 0..1000 {
            if pool.pick_peer(&format!("key-{}", i)).is_some() {
                remote += 1;
            } else {
                local += 1;
            }
        }

        assert!(local > 100, "Only {} keys were handled locally", local);
        assert!(remote > 100, "Only {} keys were handled remotely", remote);
    }

    #[test]
    fn setting_peers_replaces_all_of_them() {
        let pool = HttpPool::new(SELF);
        pool.set([OTHER]);
        assert!(pool.pick_peer("Tom").is_some());

        pool.set([SELF]);
        assert_eq!(pool.peers(), vec![SELF]);
        assert!(pool.pick_peer("Tom").is_none());
    }

    #[test]
    fn peers_follow_the_config() {
        let pool = HttpPool::new("http://localhost:1");
        let config = YamlLoader::load_from_str(
            "
peers:
    self: http://localhost:8001
    nodes:
        - http://localhost:8002
        - http://localhost:8001
        ",
        )
        .unwrap()
        .remove(0);

        pool.apply_config(&config);
        assert_eq!(pool.self_url(), SELF);
        assert_eq!(pool.peers(), vec![SELF, OTHER]);

        // A config without a peers section changes nothing...
        pool.apply_config(&YamlLoader::load_from_str("server: {}").unwrap().remove(0));
        assert_eq!(pool.peers(), vec![SELF, OTHER]);
        assert!(pool.is_self_listed());
    }

    #[test]
    fn self_must_match_a_peer_exactly() {
        let pool = HttpPool::new(SELF);
        assert!(pool.is_self_listed());

        let config = YamlLoader::load_from_str(
            "
peers:
    nodes:
        - http://127.0.0.1:8001
        - http://localhost:8002
        ",
        )
        .unwrap()
        .remove(0);
        pool.apply_config(&config);

        assert!(!pool.is_self_listed());
        assert!(pool.peers().iter().all(|peer| peer != SELF));

        pool.set_self("http://127.0.0.1:8001");
        assert!(pool.is_self_listed());
    }

    async fn mini_peer(request: Request<Body>) -> Result<Response<Body>, Infallible> {
        match request.uri().path() {
            "/_ringcache/scores/Tom%20Jones" => Ok(Response::new(Body::from(encode_value(b"630")))),
            "/_ringcache/scores/Garbage" => Ok(Response::new(Body::from(vec![0x0A, 0x7F]))),
            _ => {
                let mut response = Response::new(Body::from("no such namespace"));
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
        }
    }

    #[test]
    fn getters_fetch_and_decode_values() {
        // We want exclusive access to the 1510 port on which we fire up a test-server...
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES
            .lock()
            .unwrap_or_else(|error| error.into_inner());
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
            let server_addr: SocketAddr = "127.0.0.1:1510".parse().unwrap();
            let make_svc =
                make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(mini_peer)) });
            let server = hyper::Server::bind(&server_addr)
                .serve(make_svc)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                });
            let server_task = tokio::spawn(server);

            let getter = HttpGetter::new("http://127.0.0.1:1510/_ringcache/");
            assert_eq!(getter.get("scores", "Tom Jones").await.unwrap(), b"630");

            let error = getter.get("users", "Tom").await.unwrap_err();
            assert!(error.to_string().contains("404"), "{}", error);

            assert!(getter.get("scores", "Garbage").await.is_err());

            let _ = shutdown_tx.send(());
            let _ = server_task.await;
        });
    }
}

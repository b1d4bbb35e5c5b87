//! Contains the HTTP server which answers the requests of other peers.
//!
//! Opens a server socket on the specified port (**server.port** in the config or 8001 as
//! fallback) and binds it to the selected IP (**server.host** in the config or 0.0.0.0 as
//! fallback). Each request for `GET <base-path><namespace>/<key>` is answered by looking up
//! the key in the given namespace of the local node:
//!
//! * **200**: the body contains the encoded value (see [wire](crate::wire)).
//! * **400**: either the namespace or the key is missing.
//! * **404**: the namespace is unknown or the path doesn't start with the base path.
//! * **405**: only GET requests are supported.
//! * **500**: the value couldn't be loaded.
//!
//! Note that the server will periodically try to bind the socket to the selected port,
//! therefore a "new" instance can be started and the "old" one can bleed out and the port will
//! be "handed through" with minimal downtime. Also, this will listen to change events of the
//! config and will relocate to another port or host if changed.
//!
//! # Example
//!
//! ```no_run
//! use ringcache::builder::Builder;
//! use ringcache::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Setup and create a node...
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Specify a minimal config so that we run on a different port than a
//!     // production instance.
//!     node.config().load_from_string("
//!         server:
//!             port: 1503
//!     ", None).unwrap();
//!
//!     // Run the server...
//!     Server::new(&node).event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;

use crate::config::ChangeNotifier;
use crate::error::CacheError;
use crate::node::Node;
use crate::spawn;
use crate::wire::{encode_value, parse_path, PeerPath};

/// Specifies the interval in which the server checks if the node is still running.
///
/// When waiting for a new request we need to interrupt this every once in a while so that
/// we can check if the node has been terminated.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Specifies the delay between two attempts to bind the server socket.
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Specifies how often a failing bind is reported in the logs.
const BIND_ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Serves the namespaces of a node to its peers.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    node: Arc<Node>,
}

impl Server {
    /// Creates a new server for the given node.
    ///
    /// Note that this will not technically start the server. This has to be done manually
    /// via [event_loop](Server::event_loop) as it is most probably done in the main thread.
    pub fn new(node: &Arc<Node>) -> Arc<Self> {
        Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            node: node.clone(),
        })
    }

    /// Determines if the server socket should keep listening for incoming requests.
    ///
    /// In contrast to **Node::is_running** this is not used to control the shutdown of the
    /// server. Rather we toggle this flag to false if a config and therefore address change was
    /// detected. This way **server_loop** will exit and a new server socket for the appropriate
    /// address will be setup by the **event_loop**.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the address the server socket is currently bound to.
    pub fn current_address(&self) -> Option<String> {
        self.current_address.lock().unwrap().clone()
    }

    /// Determines the server address based on the current configuration.
    ///
    /// If no, an invalid or a partial config is present, fallback values are used. By default we
    /// use port 8001 and bind to "0.0.0.0".
    fn address(&self) -> String {
        let handle = self.node.config().current();
        format!(
            "{}:{}",
            handle.config()["server"]["host"]
                .as_str()
                .unwrap_or("0.0.0.0"),
            crate::node::port(handle.config())
        )
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main thread.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is bound.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Tries to open a server socket on the specified address to serve incoming requests.
    ///
    /// The task of this loop is to bind the server socket to the specified address. Once this was
    /// successful, we enter the **server_loop** to actually handle incoming requests. Once this
    /// loop returns, either the node is no longer running and we should exit, or the config has
    /// changed and we should try to bind the server to the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported: Option<Instant> = None;

        while self.node.is_running() {
            // If the sever is started for the first time or if it has been restarted due to a
            // config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            // Bind and hopefully enter the server_loop...
            match TcpListener::bind(&address).await {
                Ok(listener) => {
                    log::info!("Opened server socket on {}...", &address);
                    *self.current_address.lock().unwrap() = Some(address.clone());
                    if let Err(error) = self.server_loop(listener).await {
                        log::error!("Server on {} failed: {:#}", &address, error);
                    }
                    *self.current_address.lock().unwrap() = None;
                    log::info!("Closing server socket on {}.", &address);
                }
                Err(error) => {
                    // If we were unable to bind to the server, we log this every once in a while
                    // (every 5s). Otherwise we would jam the log as re retry every 500ms.
                    if last_bind_error_reported
                        .map(|reported| reported.elapsed() > BIND_ERROR_REPORT_INTERVAL)
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Serves incoming requests until either the node is terminated or the server address
    /// changed.
    async fn server_loop(&self, listener: TcpListener) -> anyhow::Result<()> {
        let config_changed_flag = self.node.config().notifier();

        let node = self.node.clone();
        let make_service = make_service_fn(move |_| {
            let node = node.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    handle_request(node.clone(), request)
                }))
            }
        });

        let listener = listener
            .into_std()
            .context("Failed to convert server socket.")?;
        hyper::Server::from_tcp(listener)
            .context("Failed to setup HTTP server.")?
            .serve(make_service)
            .with_graceful_shutdown(self.await_shutdown(config_changed_flag))
            .await
            .context("Failed to serve HTTP requests.")
    }

    /// Completes once the node is terminated or the server has to be moved to another address.
    async fn await_shutdown(&self, mut config_changed_flag: ChangeNotifier) {
        while self.node.is_running() && self.is_running() {
            tokio::select! {
                // We use a timeout here so that the while condition (esp. node.is_running())
                // is checked every once in a while...
                _ = tokio::time::sleep(SHUTDOWN_CHECK_INTERVAL) => (),
                _ = config_changed_flag.recv() => {
                    // If the config was changed, we need to check if the address itself changed...
                    let new_address = self.address();
                    if let Some(current_address) = self.current_address() {
                        if current_address != new_address {
                            log::info!("Server address has changed. Restarting server socket...");

                            // Force the event_loop to re-evaluate the expected server address...
                            self.running.store(false, Ordering::Release);
                        }
                    }
                }
            }
        }
    }
}

fn respond(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;

    response
}

/// Answers a single peer request.
async fn handle_request(
    node: Arc<Node>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    log::debug!("{} {}", request.method(), request.uri().path());

    if request.method() != Method::GET {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only GET requests are supported.",
        ));
    }

    let (namespace, key) = match parse_path(node.pool().base_path(), request.uri().path()) {
        PeerPath::Entry(namespace, key) => (namespace, key),
        PeerPath::Malformed => {
            return Ok(respond(
                StatusCode::BAD_REQUEST,
                "Expected a namespace and a key.",
            ))
        }
        PeerPath::Foreign => return Ok(respond(StatusCode::NOT_FOUND, "Unknown path.")),
    };

    let namespace = match node.registry().require(&namespace) {
        Ok(namespace) => namespace,
        Err(error) => return Ok(respond(StatusCode::NOT_FOUND, error.to_string())),
    };

    let response = match namespace.get(&key).await {
        Ok(value) => Response::builder()
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(encode_value(&value.byte_slice())))
            .unwrap_or_else(|error| respond(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())),
        Err(error @ CacheError::InvalidArgument(_)) => {
            respond(StatusCode::BAD_REQUEST, error.to_string())
        }
        Err(error) => respond(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::node::Node;
    use crate::peers::PeerGetter;
    use crate::pool::HttpGetter;
    use crate::server::Server;
    use crate::testing::test_async;
    use hyper::{Body, Client, Method, Request, StatusCode};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scores(node: &Arc<Node>, loads: Arc<AtomicUsize>) {
        let db: HashMap<&'static str, &'static str> =
            [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
                .into_iter()
                .collect();

        let _ = node
            .create_namespace("scores", move |key: String| {
                let _ = loads.fetch_add(1, Ordering::SeqCst);
                let value = match db.get(key.as_str()) {
                    Some(value) => Ok(value.as_bytes().to_vec()),
                    None if key.starts_with("key-") => Ok(key.clone().into_bytes()),
                    None => Err(anyhow::anyhow!("{} does not exist", key)),
                };
                async move { value }
            })
            .unwrap();
    }

    async fn status_of(method: Method, url: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(url)
            .body(Body::empty())
            .unwrap();

        Client::new().request(request).await.unwrap().status()
    }

    #[test]
    fn integration_test() {
        // We want exclusive access to the 1503 port on which we fire up a test-server...
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES
            .lock()
            .unwrap_or_else(|error| error.into_inner());
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            // Setup and create a node...
            let node = Builder::new().build().await;
            node.config()
                .load_from_string(
                    "
                server:
                    host: 127.0.0.1
                    port: 1503
            ",
                    None,
                )
                .unwrap();
            node.apply_config();
            let loads = Arc::new(AtomicUsize::new(0));
            scores(&node, loads.clone());

            Server::fork_and_await(&Server::new(&node)).await;

            // Fetch a value just like a peer would...
            let getter = HttpGetter::new("http://127.0.0.1:1503/_ringcache/");
            assert_eq!(getter.get("scores", "Tom").await.unwrap(), b"630");
            assert_eq!(getter.get("scores", "Tom").await.unwrap(), b"630");
            assert_eq!(loads.load(Ordering::SeqCst), 1);

            // Errors are reported via the status code...
            let base = "http://127.0.0.1:1503/_ringcache";
            let checks = [
                (Method::GET, format!("{}/scores/Unknown", base), 500),
                (Method::GET, format!("{}/users/Tom", base), 404),
                (Method::GET, format!("{}/scores", base), 400),
                (Method::GET, format!("{}/scores/", base), 400),
                (Method::GET, "http://127.0.0.1:1503/index.html".to_owned(), 404),
                (Method::POST, format!("{}/scores/Tom", base), 405),
            ];
            for (method, url, status) in checks {
                assert_eq!(status_of(method, &url).await.as_u16(), status, "{}", url);
            }

            node.terminate();
        });
    }

    #[test]
    fn peers_share_the_key_space() {
        // We want exclusive access to the 1504 and 1505 ports...
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES
            .lock()
            .unwrap_or_else(|error| error.into_inner());
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            let mut nodes = Vec::new();
            let mut counters = Vec::new();
            for port in [1504, 1505] {
                let node = Builder::new().build().await;
                node.config()
                    .load_from_string(
                        &format!(
                            "
server:
    host: 127.0.0.1
    port: {}
peers:
    self: http://127.0.0.1:{}
    nodes:
        - http://127.0.0.1:1504
        - http://127.0.0.1:1505
                            ",
                            port, port
                        ),
                        None,
                    )
                    .unwrap();
                node.apply_config();

                let loads = Arc::new(AtomicUsize::new(0));
                scores(&node, loads.clone());
                Server::fork_and_await(&Server::new(&node)).await;

                nodes.push(node);
                counters.push(loads);
            }

            // Ask the first node for all keys - it either loads them itself or asks its peer...
            let first = nodes[0].registry().require("scores").unwrap();
            for i in 0..20 {
                let key = format!("key-{}", i);
                assert_eq!(first.get(&key).await.unwrap().to_string(), key);
            }

            let local = counters[0].load(Ordering::SeqCst);
            let remote = counters[1].load(Ordering::SeqCst);
            assert_eq!(local + remote, 20);
            assert!(local > 0 && remote > 0, "local: {}, remote: {}", local, remote);

            // Values are cached by their owner, therefore nothing is loaded again...
            for i in 0..20 {
                let _ = first.get(&format!("key-{}", i)).await.unwrap();
            }
            assert_eq!(counters[0].load(Ordering::SeqCst), local);
            assert_eq!(counters[1].load(Ordering::SeqCst), remote);
            assert_eq!(first.stats().peer_loads, remote * 2);

            for node in nodes {
                node.terminate();
            }
        });
    }
}

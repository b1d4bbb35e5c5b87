//! Runs a cache node which serves the "scores" namespace.
//!
//! Start several instances with different **server.port** and **peers.self** settings (but
//! the same **peers.nodes**) to form a cluster. If **api.port** is set, the node also serves
//! `GET /api?key=<key>` for clients.
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use ringcache::builder::Builder;
use ringcache::error::CacheError;
use ringcache::namespace::Namespace;
use ringcache::node::Node;
use ringcache::server::Server;

#[tokio::main]
async fn main() {
    // Build a node and enable all features...
    let node = Builder::new().enable_all().build().await;

    let db: HashMap<&'static str, &'static str> =
        [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .collect();

    let scores = match node.create_namespace("scores", move |key: String| {
        let value = db.get(key.as_str()).map(|value| value.as_bytes().to_vec());
        async move {
            log::info!("[SlowDB] Searching for {}...", key);
            value.ok_or_else(|| anyhow::anyhow!("{} does not exist", key))
        }
    }) {
        Ok(namespace) => namespace,
        Err(error) => {
            log::error!("Failed to create namespace: {}", error);
            return;
        }
    };

    let api_port = node.config().current().query("api.port").as_i64();
    if let Some(port) = api_port.and_then(|port| u16::try_from(port).ok()) {
        let node = node.clone();
        ringcache::spawn!(async move {
            if let Err(error) = api_server(node, scores, port).await {
                log::error!("API server failed: {:#}", error);
            }
        });
    }

    Server::new(&node).event_loop().await;
}

/// Serves the given namespace to clients until the node is terminated.
async fn api_server(node: Arc<Node>, scores: Arc<Namespace>, port: u16) -> anyhow::Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let make_service = make_service_fn(move |_| {
        let scores = scores.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle_api_request(scores.clone(), request)
            }))
        }
    });

    log::info!("API server is running on {}...", address);
    hyper::Server::try_bind(&address)?
        .serve(make_service)
        .with_graceful_shutdown(async move {
            while node.is_running() {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
        .await?;

    Ok(())
}

async fn handle_api_request(
    scores: Arc<Namespace>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if request.uri().path() != "/api" {
        return Ok(respond(StatusCode::NOT_FOUND, "Unknown path.".into()));
    }

    let key = requested_key(request.uri().query());
    Ok(match scores.get(&key).await {
        Ok(value) => Response::builder()
            .header(hyper::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(value.byte_slice()))
            .unwrap_or_else(|error| {
                respond(StatusCode::INTERNAL_SERVER_ERROR, error.to_string().into())
            }),
        Err(error @ CacheError::InvalidArgument(_)) => {
            respond(StatusCode::BAD_REQUEST, error.to_string().into())
        }
        Err(error) => respond(StatusCode::INTERNAL_SERVER_ERROR, error.to_string().into()),
    })
}

/// Extracts the form encoded **key** parameter of the given query string.
fn requested_key(query: Option<&str>) -> String {
    form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .find(|(name, _)| name == "key")
        .map(|(_, key)| key.into_owned())
        .unwrap_or_default()
}

fn respond(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;

    response
}

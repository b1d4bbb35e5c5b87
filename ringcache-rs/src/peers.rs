//! Defines the seams between a namespace and the other processes of a cluster.
//!
//! A [Namespace](crate::namespace::Namespace) doesn't know how peers are reached. It only asks a
//! [PeerPicker] who owns a key and then uses the returned [PeerGetter] to fetch the value. The
//! HTTP based implementation of both is provided by the [pool](crate::pool) module, tests supply
//! their own ones.
use async_trait::async_trait;
use std::sync::Arc;

/// Determines which peer is in charge of a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the peer which owns the given key.
    ///
    /// Returns **None** if the key is owned by the local process (or if there are no peers at
    /// all). In this case the key has to be loaded locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from a single remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value of the given key in the given namespace from the peer.
    ///
    /// Any error is treated as recoverable by the caller, which then falls back to its own
    /// loader.
    async fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}

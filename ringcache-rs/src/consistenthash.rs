//! Provides a consistent hash ring which assigns keys to nodes.
//!
//! Each real node is placed on the ring several times (as so-called virtual nodes). A key is
//! owned by the first virtual node whose position is greater than or equal to the hash of the
//! key, wrapping around at the end of the ring. As the layout of the ring only depends on the
//! set of nodes, every process computes the same owner for the same key. Adding a node only
//! takes over the keys which fall in front of its own virtual nodes, all other keys stay where
//! they are.
//!
//! By default [crc32fast] is used to hash keys and nodes, which yields the same layout as the
//! CRC-32 (IEEE) checksum used by other implementations of this scheme.
//!
//! # Examples
//! ```
//! # use ringcache::consistenthash::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(["http://node-a:8001", "http://node-b:8001", "http://node-c:8001"]);
//!
//! let owner = ring.get("Tom").unwrap().to_owned();
//!
//! // Lookups are stable as long as the set of nodes doesn't change...
//! assert_eq!(ring.get("Tom").unwrap(), owner);
//! ```
use std::collections::HashMap;

/// Computes the position of a key or virtual node on the ring.
pub type HashFunction = fn(&[u8]) -> u32;

/// Maps keys onto a set of nodes.
///
/// Note that the ring performs no synchronization. The [HttpPool](crate::pool::HttpPool)
/// guards its ring with a mutex so that peer updates and lookups don't interfere.
pub struct HashRing {
    hash: HashFunction,
    replicas: usize,
    ring: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring which places each node **replicas** times.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash_function(replicas, crc32fast::hash)
    }

    /// Creates an empty ring which uses a custom hash function.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::consistenthash::HashRing;
    /// // Uses the numeric value of the key as hash...
    /// let mut ring = HashRing::with_hash_function(1, |data| {
    ///     std::str::from_utf8(data).ok().and_then(|str| str.parse().ok()).unwrap_or(0)
    /// });
    /// ring.add(["10", "20"]);
    ///
    /// // With a single replica, node "10" sits at position 010 = 10...
    /// assert_eq!(ring.get("5"), Some("10"));
    /// assert_eq!(ring.get("15"), Some("20"));
    /// // ..and everything beyond the last node wraps around.
    /// assert_eq!(ring.get("25"), Some("10"));
    /// ```
    pub fn with_hash_function(replicas: usize, hash: HashFunction) -> Self {
        HashRing {
            hash,
            replicas,
            ring: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Places the given nodes on the ring.
    ///
    /// Each node is hashed **replicas** times, prefixed with the index of the virtual node.
    /// Calling this repeatedly adds more nodes, it never replaces the existing ones.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for index in 0..self.replicas {
                let hash = (self.hash)(format!("{}{}", index, node).as_bytes());
                self.ring.push(hash);
                let _ = self.nodes.insert(hash, node.to_owned());
            }
        }

        self.ring.sort_unstable();
    }

    /// Returns the node which owns the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.ring.partition_point(|position| *position < hash) % self.ring.len();

        self.nodes
            .get(&self.ring[index])
            .map(|node| node.as_str())
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Determines if no nodes have been added yet.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns the number of virtual nodes per real node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

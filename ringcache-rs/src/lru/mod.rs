//! Provides a size constrained LRU Cache.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond its memory
//! budget. The budget is expressed in bytes and accounts for the keys and values stored in the
//! cache (see [ByteSize]). Every read moves an entry to the "most recently used" end, every
//! eviction takes place at the other end.
//!
//! Note that the cache itself performs no synchronization at all. Each
//! [Namespace](crate::namespace::Namespace) wraps its cache in a mutex which is held for each
//! lookup or insert (including all evictions being triggered by it).
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionCallback;
pub use lru_cache::LruCache;

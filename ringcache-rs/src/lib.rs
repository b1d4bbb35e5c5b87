//! ringcache is a library for distributed, read-through, in-process caching.
//!
//! # Introduction
//! Each process running **ringcache** keeps a size constrained cache per named
//! [Namespace](namespace::Namespace). Once a key is requested which isn't present locally, the
//! cache either fetches the value from the peer which owns the key or invokes a user supplied
//! loader and stores its result. Ownership of keys is determined by a
//! [consistent hash ring](consistenthash::HashRing), so that all processes agree on who is in
//! charge of which key without any coordination, and adding or removing a peer only moves a
//! small fraction of all keys.
//!
//! If many clients request the same missing key at once, only a single load is executed and
//! its result is shared by all of them (see [flight](flight)). This protects the underlying data
//! source from the so-called thundering herd.
//!
//! # Modules
//! * **LRU-Cache**: A cache which is constrained by the number of bytes its keys and values
//!   occupy (see [lru]).
//! * **Hash Ring**: Assigns keys to peers (see [consistenthash]).
//! * **Flights**: Collapses concurrent loads of the same key (see [flight]).
//! * **Namespaces**: Combines the above into a read-through cache (see [namespace] and
//!   [registry]).
//! * **Peers**: Fetches values from other processes via HTTP (see [peers], [pool], [wire] and
//!   [server]).
//!
//! # Examples
//! A complete example of running a cache node can be found in **ringcache-io**. A short example
//! on how to set up the library is provided by the [Builder](builder::Builder).
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod config;
pub mod consistenthash;
pub mod error;
pub mod flight;
pub mod fmt;
pub mod lru;
pub mod namespace;
pub mod node;
pub mod peers;
pub mod pool;
pub mod registry;
pub mod server;
pub mod signals;
pub mod wire;

/// Contains the version of the ringcache library.
pub const RINGCACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the ringcache build being used.
pub const RINGCACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// library, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests build several nodes per process, therefore we must only install the logger once...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned join handle as we never await
/// the outcome of these tasks.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ringcache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}

//! Error types for cache lookups.
//!
//! Errors are cloneable, as the outcome of a single load is shared by all callers which waited
//! for it (see [flight](crate::flight)).
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using our [CacheError].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors which can occur when reading from a cache.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The request itself is invalid (e.g. an empty key).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested namespace is unknown.
    #[error("Unknown namespace: {0}")]
    NamespaceNotFound(String),

    /// The loader failed to provide a value. The error is reported as is.
    #[error("{0}")]
    Loader(Arc<anyhow::Error>),

    /// The cache setup is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Wraps the error of a loader.
    pub fn loader(error: anyhow::Error) -> Self {
        CacheError::Loader(Arc::new(error))
    }
}

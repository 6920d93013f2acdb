//! Error types for the stash cache
//!
//! Decode errors are absorbed by the coordinator and turned into cache misses.
//! Routing, refresh and store errors reach the caller unchanged.

use thiserror::Error;

/// Boxed cause reported by a refresh collaborator
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while routing, decoding, refreshing or storing a key
#[derive(Debug, Error)]
pub enum StashError {
    /// No handler claimed the key and no fallback exists
    #[error("no handler can route key '{key}'")]
    UnroutableKey { key: String },

    /// Stored raw data could not be decoded by the handler's codec
    #[error("cannot decode key '{key}' with handler '{handler}': {reason}")]
    Decode {
        key: String,
        handler: String,
        reason: String,
    },

    /// A value could not be encoded for storage
    #[error("cannot encode key '{key}' with handler '{handler}': {reason}")]
    Encode {
        key: String,
        handler: String,
        reason: String,
    },

    /// The value is stale or missing and the handler cannot refresh it
    #[error("cannot refresh key '{key}': no refresh method for handler '{handler}'")]
    NoRefreshMethod { key: String, handler: String },

    /// The refresh collaborator reported a failure
    #[error("refresh failed for key '{key}': {source}")]
    RefreshFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The stored value decoded to nothing and the handler does not allow that
    #[error("key '{key}' decoded to an undefined value, which handler '{handler}' does not allow")]
    UndefinedResult { key: String, handler: String },

    /// A codec tag that is not part of the closed codec set
    #[error("unknown codec type '{0}'. Valid types: text, json")]
    UnknownCodec(String),

    /// The external store failed to read or write
    #[error("store error for key '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A handler pattern is not a valid regular expression
    #[error("invalid handler pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// JSON parsing error outside of a cached value
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error outside of the store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StashError {
    /// The cache key this error relates to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            StashError::UnroutableKey { key }
            | StashError::Decode { key, .. }
            | StashError::Encode { key, .. }
            | StashError::NoRefreshMethod { key, .. }
            | StashError::RefreshFailed { key, .. }
            | StashError::UndefinedResult { key, .. }
            | StashError::Store { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StashError>;

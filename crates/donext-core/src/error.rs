//! Core error types for donext-core.
//!
//! Every fallible boundary gets its own thiserror enum; `CoreError` collects
//! them for the handlers. None of these ever leave `Dispatcher::process`:
//! the dispatcher turns them into a generic response envelope.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for donext-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generative boundary errors that escaped a step (should not happen)
    #[error("Generative error: {0}")]
    Generative(#[from] GenerativeError),

    /// No work to recommend this cycle
    #[error("no candidates")]
    NoCandidates,

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage adapter errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing store
    #[error("Failed to open storage at {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },

    /// A read failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// A write failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Schema migration failed
    #[error("Storage migration failed: {0}")]
    MigrationFailed(String),

    /// The user id does not resolve to anything in the store
    #[error("Unknown user: {0}")]
    UnknownUser(String),
}

/// Errors returned by a generative boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerativeError {
    /// Network failure, quota exhaustion, non-success HTTP status
    #[error("Generative backend unavailable: {0}")]
    Unavailable(String),

    /// The per-call timeout elapsed
    #[error("Generative call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The backend answered but the answer is not structured JSON
    #[error("Generative reply could not be parsed: {0}")]
    Parse(String),
}

/// A generated reply that parsed but broke its output contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Reply does not have the expected shape
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// A field broke a bound or membership rule
    #[error("contract violation on '{field}': {message}")]
    Contract { field: String, message: String },
}

impl ValidationFailure {
    pub(crate) fn contract(field: &str, message: impl Into<String>) -> Self {
        ValidationFailure::Contract {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Home/data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::ReadFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

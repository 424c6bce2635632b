//! Error types for collection stores

use std::path::PathBuf;
use thiserror::Error;

/// Collection store error type
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing file or engine could not be opened or created
    #[error("Failed to open store at {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    /// Table creation was rejected by the engine
    #[error("Failed to create table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Item could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Stored payload does not parse back into the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Engine rejected a statement
    #[error("Statement error: {0}")]
    Statement(#[from] rusqlite::Error),

    /// Begin, commit or rollback of a bulk operation failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The store's worker is no longer accepting work
    #[error("Store {0} is closed")]
    Closed(String),

    /// Streaming was requested without a Tokio runtime to drive it
    #[error("No async runtime available: {0}")]
    Runtime(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

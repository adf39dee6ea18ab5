// src/core/errors.rs

//! Defines the primary error type for the storage engine.

use thiserror::Error;

/// The main error enum, representing every failure a list operation can surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpinelKvError {
    /// The operation requires an existing key and none exists.
    #[error("Key not found")]
    KeyNotFound,

    /// An argument is outside the accepted domain, e.g. an index out of range.
    #[error("ERR {0}")]
    InvalidArgument(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// A record promised by the metadata bookkeeping is missing or malformed.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// Any failure of the underlying store unrelated to key presence.
    #[error("IO Error: {0}")]
    Io(String),
}

// --- From trait implementations for easy error conversion ---

impl From<sled::Error> for SpinelKvError {
    fn from(e: sled::Error) -> Self {
        match e {
            ref corruption @ sled::Error::Corruption { .. } => {
                SpinelKvError::DataCorruption(corruption.to_string())
            }
            other => SpinelKvError::Io(other.to_string()),
        }
    }
}

impl From<sled::transaction::TransactionError<()>> for SpinelKvError {
    fn from(e: sled::transaction::TransactionError<()>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(()) => {
                SpinelKvError::Io("write batch aborted".to_string())
            }
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

//! Error types for the royalty ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Royalty ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed required field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown track reference
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Unknown artist reference
    #[error("Artist not found: {0}")]
    ArtistNotFound(String),

    /// Unknown ledger entry
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Business-rule violation: balance too low for the requested debit
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the caller asked to withdraw
        requested: String,
        /// Balance available after active holds
        available: String,
    },

    /// Playback session nonce already consumed
    #[error("Playback session already settled: {0}")]
    DuplicateSession(String),

    /// Withdrawal hold not found (already committed or released)
    #[error("Withdrawal hold not found: {0}")]
    HoldNotFound(String),

    /// Invariant violation (counters diverged from the ledger, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

//! Closed error-kind set for the storage engine and its collaborators.
//!
//! `NotFound` is intentionally absent: a missing URI is represented
//! structurally (`None` / an empty `Vec`), never as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XdbiError {
    #[error("working graph is not set or the database path does not exist")]
    NotReady,

    #[error("write attempted on a read-only interface")]
    ReadOnly,

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("failed to acquire lock for graph '{graph}': {source}")]
    LockFailure {
        graph: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O failure on {path}: {source}")]
    IoFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid federation configuration: {0}")]
    InvalidConfig(String),

    #[error("remote transport failure: {0}")]
    Transport(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, XdbiError>;

//! Error types for spirits-core

use thiserror::Error;

use crate::models::{GlobalId, OperationIndex, SiteId};

/// Result type alias using spirits-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spirits-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The persistent store could not be opened or migrated
    #[error("Could not open store: {0}")]
    CouldNotOpenStore(String),

    /// A sync tried to apply operations whose causal predecessors are absent
    #[error(
        "Missing preceding operations for site {site}: log starts at {starting_index}, store has {known} operations"
    )]
    MissingPrecedingOperations {
        site: SiteId,
        starting_index: OperationIndex,
        known: u64,
    },

    /// Commit/sync branch misused (e.g. a site syncing its own write)
    #[error("Wrong sync/commit choice: {0}")]
    WrongSyncCommitChoice(String),

    /// Expected and stored operation disagree
    #[error("Mismatched operation at {operation}: {reason}")]
    MismatchedOperation { operation: GlobalId, reason: String },

    /// Malformed operation log entry or payload
    #[error("Improper operation format: {0}")]
    ImproperOperationFormat(String),

    /// Atomicity or invariant violation inside the store
    #[error("Internal store error: {0}")]
    Internal(String),

    /// Catch-all
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("Check-in not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

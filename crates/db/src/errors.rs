use fedpeg_primitives::DepositId;
use thiserror::Error;

/// Errors surfaced by transfer database backends.
///
/// Callers treat any of these as fatal to the store instance: the store
/// rolls its in-memory state back to pre-operation values and re-raises.
#[derive(Debug, Error)]
pub enum DbError {
    /// A persisted record could not be decoded.
    #[error("corrupt record for deposit {0}")]
    CorruptTransfer(DepositId),

    /// A persisted `common` table entry could not be decoded.
    #[error("corrupt common entry: {0}")]
    CorruptCommonEntry(&'static str),

    /// Failure inside the backing key-value store.
    #[error("storage: {0}")]
    Storage(String),

    /// Failure committing an atomic write batch.
    #[error("transaction: {0}")]
    Transaction(String),

    /// Other unspecified error.
    #[error("{0}")]
    Other(String),
}

pub type DbResult<T> = Result<T, DbError>;

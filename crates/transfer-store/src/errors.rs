use fedpeg_db::DbError;
use fedpeg_primitives::DepositId;
use thiserror::Error;

/// Errors surfaced by transfer store operations.
///
/// Storage errors are fatal to the store instance: the failed operation has
/// rolled the in-memory state back to its pre-operation values and callers
/// should restart the store, re-initializing from the database alone.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] DbError),

    #[error("wallet: {0}")]
    Wallet(String),

    #[error("chain: {0}")]
    Chain(String),

    /// The persisted draft transaction of a transfer failed to decode.
    #[error("corrupt draft transaction for deposit {0}")]
    CorruptTransaction(DepositId),

    /// A transfer that must carry a draft transaction does not.
    #[error("transfer {0} has no draft transaction")]
    MissingPartialTransaction(DepositId),

    /// A deposit batch violated the strict height ordering contract.
    #[error("deposit {id} matured at height {got}, expected {expected}")]
    UnexpectedDepositHeight {
        id: DepositId,
        got: u32,
        expected: u32,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

//! The cross-chain transfer store: the stateful, crash-consistent engine of
//! a federated two-way peg.
//!
//! Given mature deposits observed on the counter-chain and this chain's
//! blocks as they arrive, the store builds, co-signs, tracks and confirms
//! the withdrawal transactions releasing the pegged funds, exactly once per
//! deposit. Withdrawal construction is deterministic so every federation
//! member produces byte-identical unsigned transactions that can be merged
//! into one multi-signed transaction.
//!
//! The store owns three pieces of state:
//!
//! - the `transfers` and `common` tables of a [`TransferDatabase`], mutated
//!   only through atomic write batches;
//! - in-memory reverse indexes (by status, by containing block), rebuilt on
//!   [`initialize`](CrossChainTransferStore::initialize) and updated only
//!   after a successful commit;
//! - the federation multisig wallet, whose UTXO reservations are kept in
//!   lock-step with the persisted transfers.
//!
//! All operations are serialized by one internal lock; reads synchronize
//! against the wallet tip first so results are never stale relative to the
//! wallet.

pub mod builder;
pub mod chain;
pub mod config;
pub mod errors;
mod indexes;
mod store;
mod sync;
mod tracker;
mod validation;
pub mod wallet;

pub use builder::build_deterministic_withdrawal;
pub use chain::{BlockRepository, ChainIndex};
pub use config::StoreConfig;
pub use errors::{StoreError, StoreResult};
pub use store::CrossChainTransferStore;
pub use wallet::{FederationWallet, SpendableOutput};

//! Common types shared across the federated peg crates.
//!
//! Everything here is small, copyable where possible, and
//! borsh-serializable so it can be embedded directly in persisted records.

pub mod block;
pub mod buf;
pub mod deposit;
mod macros;
pub mod withdrawal;

pub use block::{BlockLocation, ChainTip};
pub use buf::Buf32;
pub use deposit::{Deposit, DepositId, MaturedBlockDeposits};
pub use withdrawal::Withdrawal;

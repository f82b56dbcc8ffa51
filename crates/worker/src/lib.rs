//! Event bridge between the gossip layer and the transfer store.
//!
//! Matured-block deposit batches arrive over a channel in whatever order
//! the network delivers them; the [`DepositPersister`] feeds them to the
//! store strictly in counter-chain height order, buffering early arrivals
//! and re-requesting what is missing, rate-limited per height.

mod persister;
mod throttle;

pub use persister::{DepositPersister, MatureBlockRequester};
pub use throttle::RequestThrottle;

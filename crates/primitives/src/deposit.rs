use arbitrary::Arbitrary;
use bitcoin::{Amount, ScriptBuf, Txid};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// Identifier of a counter-chain deposit transaction.
///
/// This is the deposit transaction's id on the counter-chain and the
/// primary key of the transfer store.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Default,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct DepositId(Buf32);

impl DepositId {
    pub const fn new(inner: Buf32) -> Self {
        Self(inner)
    }

    pub const fn inner(&self) -> &Buf32 {
        &self.0
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<Buf32> for DepositId {
    fn from(value: Buf32) -> Self {
        Self(value)
    }
}

impl From<Txid> for DepositId {
    fn from(txid: Txid) -> Self {
        Self(txid.into())
    }
}

impl std::fmt::Display for DepositId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A mature deposit observed on the counter-chain.
///
/// Carries everything the transfer store needs to build the matching
/// withdrawal on this chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deposit {
    id: DepositId,
    target_script: ScriptBuf,
    amount: Amount,
    block_number: u32,
}

impl Deposit {
    pub fn new(id: DepositId, target_script: ScriptBuf, amount: Amount, block_number: u32) -> Self {
        Self {
            id,
            target_script,
            amount,
            block_number,
        }
    }

    pub const fn id(&self) -> &DepositId {
        &self.id
    }

    /// Output script locking the withdrawn funds on this chain.
    pub fn target_script(&self) -> &ScriptBuf {
        &self.target_script
    }

    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Counter-chain height at which this deposit matured.
    pub const fn block_number(&self) -> u32 {
        self.block_number
    }
}

/// One counter-chain block's worth of mature deposits, as delivered by the
/// gossip layer. `deposits` may be empty for blocks without deposits; the
/// store still consumes the batch to advance its counter-chain cursor.
#[derive(Clone, Debug)]
pub struct MaturedBlockDeposits {
    pub block_height: u32,
    pub deposits: Vec<Deposit>,
}

impl MaturedBlockDeposits {
    pub fn new(block_height: u32, deposits: Vec<Deposit>) -> Self {
        Self {
            block_height,
            deposits,
        }
    }
}

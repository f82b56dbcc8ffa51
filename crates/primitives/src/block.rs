use arbitrary::Arbitrary;
use bitcoin::BlockHash;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// A block position on this chain: header hash plus height.
///
/// Field order is part of the persisted record layout (hash first, then
/// height as 4 little-endian bytes) and must not change.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockLocation {
    hash: Buf32,
    height: u32,
}

impl BlockLocation {
    pub const fn new(hash: Buf32, height: u32) -> Self {
        Self { hash, height }
    }

    pub fn from_block_hash(hash: BlockHash, height: u32) -> Self {
        Self {
            hash: hash.into(),
            height,
        }
    }

    pub const fn hash(&self) -> &Buf32 {
        &self.hash
    }

    pub fn block_hash(&self) -> BlockHash {
        self.hash.into()
    }

    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}

/// The last block of this chain whose withdrawals have been recorded.
pub type ChainTip = BlockLocation;

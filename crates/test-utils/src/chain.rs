//! In-memory chain index and block repository with reorg support.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bitcoin::{
    block, hashes::Hash, Block, BlockHash, CompactTarget, Transaction, TxMerkleNode,
};
use fedpeg_primitives::BlockLocation;
use fedpeg_transfer_store::{BlockRepository, ChainIndex, StoreResult};

#[derive(Debug, Default)]
struct ChainState {
    /// Every block ever produced, by hash, with its height.
    known: HashMap<BlockHash, (Block, u32)>,
    /// The active branch; index `i` holds the block at height `i + 1`.
    active: Vec<BlockHash>,
    /// Makes sibling blocks at the same height hash differently.
    nonce: u32,
}

/// A scriptable local chain shared by a [`ChainIndex`] and a
/// [`BlockRepository`] view. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block of `txs` to the active branch and returns its
    /// location.
    pub fn push_block(&self, txs: Vec<Transaction>) -> BlockLocation {
        let mut state = self.state.lock().unwrap();
        let prev = state
            .active
            .last()
            .copied()
            .unwrap_or_else(BlockHash::all_zeros);
        state.nonce += 1;
        let block = Block {
            header: block::Header {
                version: block::Version::ONE,
                prev_blockhash: prev,
                merkle_root: TxMerkleNode::all_zeros(),
                time: state.nonce,
                bits: CompactTarget::from_consensus(0x207fffff),
                nonce: state.nonce,
            },
            txdata: txs,
        };
        let hash = block.block_hash();
        let height = state.active.len() as u32 + 1;
        state.known.insert(hash, (block, height));
        state.active.push(hash);
        BlockLocation::from_block_hash(hash, height)
    }

    /// Truncates the active branch down to `height`. Disconnected blocks
    /// stay known (as a stale branch).
    pub fn reorg_to(&self, height: u32) {
        let mut state = self.state.lock().unwrap();
        state.active.truncate(height as usize);
    }

    pub fn tip(&self) -> Option<BlockLocation> {
        let state = self.state.lock().unwrap();
        state
            .active
            .last()
            .map(|hash| BlockLocation::from_block_hash(*hash, state.active.len() as u32))
    }

    /// Drops a block from the repository view entirely, simulating a node
    /// that cannot serve it.
    pub fn forget_block(&self, hash: &BlockHash) {
        let mut state = self.state.lock().unwrap();
        state.known.remove(hash);
    }
}

#[async_trait]
impl ChainIndex for MockChain {
    async fn get_block(&self, hash: &BlockHash) -> StoreResult<Option<BlockLocation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .known
            .get(hash)
            .map(|(_, height)| BlockLocation::from_block_hash(*hash, *height)))
    }

    async fn is_on_active_chain(&self, hash: &BlockHash) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.active.contains(hash))
    }

    async fn find_fork(&self, locator: &[BlockHash]) -> StoreResult<Option<BlockLocation>> {
        let state = self.state.lock().unwrap();
        for hash in locator {
            if let Some(pos) = state.active.iter().position(|h| h == hash) {
                return Ok(Some(BlockLocation::from_block_hash(*hash, pos as u32 + 1)));
            }
        }
        Ok(None)
    }

    async fn enumerate_to_tip(&self, from: Option<BlockHash>) -> StoreResult<Vec<BlockLocation>> {
        let state = self.state.lock().unwrap();
        let start = match from {
            None => 0,
            Some(hash) => match state.active.iter().position(|h| *h == hash) {
                Some(pos) => pos + 1,
                None => return Ok(vec![]),
            },
        };
        Ok(state.active[start..]
            .iter()
            .enumerate()
            .map(|(offset, hash)| {
                BlockLocation::from_block_hash(*hash, (start + offset) as u32 + 1)
            })
            .collect())
    }
}

#[async_trait]
impl BlockRepository for MockChain {
    async fn get_blocks(&self, hashes: &[BlockHash]) -> StoreResult<Vec<Option<Block>>> {
        let state = self.state.lock().unwrap();
        Ok(hashes
            .iter()
            .map(|hash| state.known.get(hash).map(|(block, _)| block.clone()))
            .collect())
    }
}

//! Contracts with the local blockchain node: header index and block
//! storage. Both are read-only from the store's perspective.

use async_trait::async_trait;
use bitcoin::{Block, BlockHash};
use fedpeg_primitives::BlockLocation;

use crate::errors::StoreResult;

/// The node's header chain index.
#[async_trait]
pub trait ChainIndex: Send + Sync + 'static {
    /// Looks up a header by hash, on any known branch.
    async fn get_block(&self, hash: &BlockHash) -> StoreResult<Option<BlockLocation>>;

    /// Whether the hash is part of the currently active branch.
    async fn is_on_active_chain(&self, hash: &BlockHash) -> StoreResult<bool>;

    /// Highest active-chain block contained in the locator, or `None` when
    /// the locator has no intersection with the active chain at all.
    async fn find_fork(&self, locator: &[BlockHash]) -> StoreResult<Option<BlockLocation>>;

    /// Active-chain headers strictly after `from` (from genesis when
    /// `None`), ascending. Empty when `from` is unknown or already the tip.
    async fn enumerate_to_tip(&self, from: Option<BlockHash>) -> StoreResult<Vec<BlockLocation>>;
}

/// Batch access to full blocks.
#[async_trait]
pub trait BlockRepository: Send + Sync + 'static {
    /// Fetches blocks by hash, preserving order; `None` for blocks the
    /// node does not have (callers stop their batch there).
    async fn get_blocks(&self, hashes: &[BlockHash]) -> StoreResult<Vec<Option<Block>>>;
}

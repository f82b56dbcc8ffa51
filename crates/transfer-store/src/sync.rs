//! Chain following: pull local blocks up to the wallet's tip in bounded
//! batches, detect divergence from the wallet and execute reorgs.
//!
//! The wallet's tip is authoritative. Rewinds run between batches; reorgs
//! are a routine control path here, not an error.

use std::collections::HashMap;

use bitcoin::{Block, BlockHash};
use fedpeg_db::types::{CrossChainTransfer, TransferStatus, TransferWriteBatch};
use fedpeg_primitives::{BlockLocation, ChainTip, DepositId};
use tracing::{debug, info, warn};

use crate::{
    errors::StoreResult,
    store::{CrossChainTransferStore, StoreInner},
    tracker::StatusTracker,
};

impl CrossChainTransferStore {
    /// Brings the store's tip up to the wallet's `tip_to_chase`, rewinding
    /// first where required. Returns early between batches when shutdown
    /// is signalled; never yields the store lock while running.
    pub(crate) async fn synchronize_locked(&self, inner: &mut StoreInner) -> StoreResult<()> {
        loop {
            if *self.shutdown.borrow() {
                debug!("synchronization cancelled");
                return Ok(());
            }
            if self.rewind_if_required(inner).await? {
                continue;
            }
            if self.synchronize_batch(inner).await? {
                return Ok(());
            }
        }
    }

    /// Detects divergence between our tip and the wallet's. Returns `true`
    /// when a rewind happened and synchronization must re-evaluate.
    async fn rewind_if_required(&self, inner: &mut StoreInner) -> StoreResult<bool> {
        let Some(our_tip) = inner.tip else {
            return Ok(false);
        };
        let wallet_tip = self.wallet.tip_to_chase().await?;
        if our_tip.hash() == wallet_tip.hash() {
            return Ok(false);
        }

        if self.chain.get_block(&wallet_tip.block_hash()).await?.is_none() {
            // The wallet is ahead of the node on a stale branch; rewind it
            // to where its locator meets the active chain. An empty
            // intersection rewinds the wallet to genesis.
            let locator = self.wallet.block_locator().await?;
            let fork = self.chain.find_fork(&locator).await?;
            warn!(wallet_tip = %wallet_tip, fork = ?fork, "wallet tip unknown to chain index, rewinding wallet");
            self.wallet.remove_blocks(fork).await?;
            self.wallet.save().await?;
            return Ok(true);
        }

        let on_active = self.chain.is_on_active_chain(&our_tip.block_hash()).await?;
        if our_tip.height() > wallet_tip.height() || !on_active {
            self.execute_reorg(inner, &wallet_tip).await?;
            self.validate_transfers_locked(inner).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Rewinds the store below the wallet's tip. Transfers seen in blocks
    /// above the fork drop back to `FullySigned`; seen-only transfers with
    /// no recorded deposit height are deleted since we cannot rebuild
    /// them. Index removals happen only after the commit.
    async fn execute_reorg(&self, inner: &mut StoreInner, wallet_tip: &ChainTip) -> StoreResult<()> {
        // The fork is the highest block we saw withdrawals in that is
        // still on the active chain at or below the wallet's height. No
        // candidate means rewinding to genesis.
        let mut fork: Option<BlockLocation> = None;
        for (hash, height) in inner.indexes.tracked_blocks() {
            if height > wallet_tip.height() {
                continue;
            }
            let block_hash: BlockHash = hash.into();
            if self.chain.is_on_active_chain(&block_hash).await? {
                fork = Some(BlockLocation::new(hash, height));
                break;
            }
        }

        let mut batch = TransferWriteBatch::new();
        let mut tracker = StatusTracker::new();
        let mut downgraded = 0usize;
        let mut deleted = 0usize;

        for (hash, height) in inner.indexes.tracked_blocks() {
            let above_fork = match &fork {
                Some(f) => height > f.height() || (height == f.height() && hash != *f.hash()),
                None => true,
            };
            if !above_fork {
                continue;
            }
            for id in inner.indexes.deposits_in_block(&hash) {
                let Some(mut transfer) = self.db.get_transfer(&id)? else {
                    continue;
                };
                if transfer.status() != TransferStatus::SeenInBlock {
                    warn!(deposit_id = %id, status = ?transfer.status(), "block index entry for non-seen transfer");
                    continue;
                }
                if transfer.deposit_height().is_some() {
                    let old_block = transfer.block().copied();
                    transfer.unsee();
                    tracker.record_change(transfer.clone(), TransferStatus::SeenInBlock, old_block);
                    batch.put_transfer(transfer);
                    downgraded += 1;
                } else {
                    batch.delete_transfer(id);
                    tracker.record_delete(transfer);
                    deleted += 1;
                }
            }
        }

        batch.set_tip(fork);
        self.db.commit(batch)?;
        tracker.apply(&mut inner.indexes);
        inner.tip = fork;
        warn!(fork = ?fork, downgraded, deleted, "reorg executed");
        Ok(())
    }

    /// Consumes up to one batch of blocks. Returns `true` once our tip
    /// matches the wallet's (or no further progress is possible).
    async fn synchronize_batch(&self, inner: &mut StoreInner) -> StoreResult<bool> {
        let wallet_tip = self.wallet.tip_to_chase().await?;
        if inner.tip.as_ref().map(|t| t.hash()) == Some(wallet_tip.hash()) {
            return Ok(true);
        }

        let from = inner.tip.map(|t| t.block_hash());
        let headers = self.chain.enumerate_to_tip(from).await?;
        let wanted: Vec<BlockLocation> = headers
            .into_iter()
            .filter(|h| h.height() <= wallet_tip.height())
            .take(self.config.sync_batch_size)
            .collect();
        if wanted.is_empty() {
            debug!(tip = ?inner.tip, wallet_tip = %wallet_tip, "no headers to consume");
            return Ok(true);
        }

        let hashes: Vec<BlockHash> = wanted.iter().map(|h| h.block_hash()).collect();
        let blocks = self.blocks.get_blocks(&hashes).await?;
        let mut pairs = Vec::new();
        for (location, block) in wanted.iter().zip(blocks) {
            match block {
                Some(block) => pairs.push((*location, block)),
                None => {
                    warn!(block = %location, "block repository is missing a block, truncating batch");
                    break;
                }
            }
        }
        if pairs.is_empty() {
            return Ok(true);
        }

        let caught_up = pairs.last().map(|(loc, _)| *loc.hash()) == Some(*wallet_tip.hash());
        self.put_blocks_locked(inner, pairs).await?;
        Ok(caught_up)
    }

    /// Records the withdrawals of consecutive blocks and advances the tip,
    /// all in one atomic batch.
    async fn put_blocks_locked(
        &self,
        inner: &mut StoreInner,
        blocks: Vec<(BlockLocation, Block)>,
    ) -> StoreResult<()> {
        let Some(new_tip) = blocks.last().map(|(location, _)| *location) else {
            return Ok(());
        };

        let mut batch = TransferWriteBatch::new();
        let mut tracker = StatusTracker::new();
        // Later blocks in the batch must see the mutations of earlier
        // ones, which are not committed yet.
        let mut pending: HashMap<DepositId, CrossChainTransfer> = HashMap::new();

        for (location, block) in &blocks {
            for withdrawal in self.extractor.extract_from_block(block, location.height()) {
                let Some(tx) = block
                    .txdata
                    .iter()
                    .find(|tx| tx.compute_txid() == *withdrawal.id())
                else {
                    continue;
                };

                let existing = match pending.get(withdrawal.deposit_id()) {
                    Some(transfer) => Some(transfer.clone()),
                    None => self.db.get_transfer(withdrawal.deposit_id())?,
                };
                match existing {
                    None => {
                        let transfer = CrossChainTransfer::new_seen_in_block(
                            *withdrawal.deposit_id(),
                            withdrawal.amount(),
                            withdrawal.target_script(),
                            tx,
                            *location,
                        );
                        info!(deposit_id = %withdrawal.deposit_id(), block = %location, "observed withdrawal for unknown deposit");
                        tracker.record_new(transfer.clone());
                        pending.insert(*withdrawal.deposit_id(), transfer);
                    }
                    Some(mut transfer) => {
                        if transfer.status() == TransferStatus::Rejected {
                            warn!(deposit_id = %withdrawal.deposit_id(), "rejected deposit appears withdrawn, ignoring");
                            continue;
                        }
                        if transfer.block() == Some(location) {
                            continue;
                        }
                        let old_status = transfer.status();
                        let old_block = transfer.block().copied();
                        transfer.set_seen_in_block(tx, *location);
                        info!(deposit_id = %withdrawal.deposit_id(), block = %location, "withdrawal seen in block");
                        tracker.record_change(transfer.clone(), old_status, old_block);
                        pending.insert(*withdrawal.deposit_id(), transfer);
                    }
                }
            }
        }

        for transfer in pending.into_values() {
            batch.put_transfer(transfer);
        }
        batch.set_tip(Some(new_tip));
        self.db.commit(batch)?;
        tracker.apply(&mut inner.indexes);
        inner.tip = Some(new_tip);
        Ok(())
    }
}

//! In-memory reverse lookups over the `transfers` table.
//!
//! Rebuilt from a full scan at initialization and mutated only by folding
//! a committed [`StatusTracker`](crate::tracker::StatusTracker) in, so a
//! failed database commit leaves them untouched.

use std::collections::{BTreeSet, HashMap};

use fedpeg_db::types::{CrossChainTransfer, TransferStatus};
use fedpeg_primitives::{Buf32, DepositId};

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TransferIndexes {
    deposits_by_status: HashMap<TransferStatus, BTreeSet<DepositId>>,
    deposit_ids_by_block_hash: HashMap<Buf32, BTreeSet<DepositId>>,
    block_heights_by_block_hash: HashMap<Buf32, u32>,
}

impl TransferIndexes {
    pub(crate) fn rebuild(transfers: &[CrossChainTransfer]) -> Self {
        let mut indexes = Self::default();
        for transfer in transfers {
            indexes.insert(transfer);
        }
        indexes
    }

    pub(crate) fn insert(&mut self, transfer: &CrossChainTransfer) {
        self.deposits_by_status
            .entry(transfer.status())
            .or_default()
            .insert(*transfer.deposit_id());
        if let Some(block) = transfer.block() {
            self.deposit_ids_by_block_hash
                .entry(*block.hash())
                .or_default()
                .insert(*transfer.deposit_id());
            self.block_heights_by_block_hash
                .insert(*block.hash(), block.height());
        }
    }

    pub(crate) fn remove_from_status(&mut self, status: TransferStatus, id: &DepositId) {
        if let Some(bucket) = self.deposits_by_status.get_mut(&status) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.deposits_by_status.remove(&status);
            }
        }
    }

    /// Drops one deposit's membership of a block; the height entry goes
    /// with the last member so a hash is mapped iff some transfer
    /// references it.
    pub(crate) fn remove_from_block(&mut self, hash: &Buf32, id: &DepositId) {
        if let Some(bucket) = self.deposit_ids_by_block_hash.get_mut(hash) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.deposit_ids_by_block_hash.remove(hash);
                self.block_heights_by_block_hash.remove(hash);
            }
        }
    }

    /// Deposit ids currently in `status`, in id order.
    pub(crate) fn by_status(&self, status: TransferStatus) -> Vec<DepositId> {
        self.deposits_by_status
            .get(&status)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_any(&self, status: TransferStatus) -> bool {
        self.deposits_by_status
            .get(&status)
            .is_some_and(|bucket| !bucket.is_empty())
    }

    /// Blocks some transfer was seen in, highest first.
    pub(crate) fn tracked_blocks(&self) -> Vec<(Buf32, u32)> {
        let mut blocks: Vec<_> = self
            .block_heights_by_block_hash
            .iter()
            .map(|(hash, height)| (*hash, *height))
            .collect();
        blocks.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        blocks
    }

    pub(crate) fn deposits_in_block(&self, hash: &Buf32) -> Vec<DepositId> {
        self.deposit_ids_by_block_hash
            .get(hash)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{Amount, ScriptBuf};
    use fedpeg_primitives::BlockLocation;

    use super::*;

    fn suspended(seed: u8) -> CrossChainTransfer {
        CrossChainTransfer::new_suspended(
            DepositId::new(Buf32::from([seed; 32])),
            5,
            Amount::from_sat(100),
            &ScriptBuf::new(),
        )
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let transfers = vec![suspended(1), suspended(2)];
        let rebuilt = TransferIndexes::rebuild(&transfers);

        let mut incremental = TransferIndexes::default();
        for t in &transfers {
            incremental.insert(t);
        }
        assert_eq!(rebuilt, incremental);
        assert_eq!(rebuilt.by_status(TransferStatus::Suspended).len(), 2);
    }

    #[test]
    fn test_block_entries_drop_with_last_member() {
        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        let id = DepositId::new(Buf32::from([1; 32]));
        let block = BlockLocation::new(Buf32::from([7; 32]), 40);
        let seen = CrossChainTransfer::new_seen_in_block(
            id,
            Amount::from_sat(1),
            &ScriptBuf::new(),
            &tx,
            block,
        );

        let mut indexes = TransferIndexes::default();
        indexes.insert(&seen);
        assert_eq!(indexes.tracked_blocks(), vec![(*block.hash(), 40)]);

        indexes.remove_from_block(block.hash(), &id);
        assert!(indexes.tracked_blocks().is_empty());
        assert!(indexes.deposits_in_block(block.hash()).is_empty());
    }
}

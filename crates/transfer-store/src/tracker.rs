//! Scratch log of status changes produced by one mutating operation.
//!
//! The tracker is the mechanism behind the commit-before-index-update
//! rule: an operation records every change here while building its write
//! batch, commits the batch, and only then folds the tracker into the
//! in-memory indexes. If the commit fails the tracker is simply dropped
//! and the indexes stay byte-identical to their pre-operation state.

use fedpeg_db::types::{CrossChainTransfer, TransferStatus};
use fedpeg_primitives::BlockLocation;

use crate::indexes::TransferIndexes;

#[derive(Debug)]
struct TrackedChange {
    /// Post-operation record; for deletions, the record as it was.
    transfer: CrossChainTransfer,
    /// Status before the operation; `None` for newly created transfers.
    old_status: Option<TransferStatus>,
    /// Block membership before the operation.
    old_block: Option<BlockLocation>,
    deleted: bool,
}

#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    changes: Vec<TrackedChange>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a brand new transfer.
    pub(crate) fn record_new(&mut self, transfer: CrossChainTransfer) {
        self.changes.push(TrackedChange {
            transfer,
            old_status: None,
            old_block: None,
            deleted: false,
        });
    }

    /// Records a mutation of an existing transfer. `old_status` and
    /// `old_block` are the values before the mutation.
    pub(crate) fn record_change(
        &mut self,
        transfer: CrossChainTransfer,
        old_status: TransferStatus,
        old_block: Option<BlockLocation>,
    ) {
        self.changes.push(TrackedChange {
            transfer,
            old_status: Some(old_status),
            old_block,
            deleted: false,
        });
    }

    /// Records a deletion; `transfer` is the record being removed.
    pub(crate) fn record_delete(&mut self, transfer: CrossChainTransfer) {
        let old_status = transfer.status();
        let old_block = transfer.block().copied();
        self.changes.push(TrackedChange {
            transfer,
            old_status: Some(old_status),
            old_block,
            deleted: true,
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Folds the committed changes into the indexes. Consumes the tracker;
    /// call only after the database commit succeeded.
    pub(crate) fn apply(self, indexes: &mut TransferIndexes) {
        for change in self.changes {
            if let Some(old_status) = change.old_status {
                indexes.remove_from_status(old_status, change.transfer.deposit_id());
            }
            if let Some(old_block) = &change.old_block {
                indexes.remove_from_block(old_block.hash(), change.transfer.deposit_id());
            }
            if !change.deleted {
                indexes.insert(&change.transfer);
            }
        }
    }
}

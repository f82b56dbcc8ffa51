//! The cross-chain transfer store proper: lifecycle, queries, deposit
//! ingestion and signature merging. Chain following and reorg handling
//! live in the synchronizer half of this type (`sync.rs`).

use std::sync::Arc;

use bitcoin::{hashes::Hash, Transaction};
use fedpeg_db::{
    types::{CrossChainTransfer, TransferStatus, TransferWriteBatch},
    TransferDatabase,
};
use fedpeg_extractor::WithdrawalExtractor;
use fedpeg_primitives::{ChainTip, Deposit, DepositId};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    builder::build_deterministic_withdrawal,
    chain::{BlockRepository, ChainIndex},
    config::StoreConfig,
    errors::{StoreError, StoreResult},
    indexes::TransferIndexes,
    tracker::StatusTracker,
    validation,
    wallet::FederationWallet,
};

/// State guarded by the store's single lock.
#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub(crate) initialized: bool,
    pub(crate) indexes: TransferIndexes,
    /// Highest local-chain block whose withdrawals have been recorded.
    pub(crate) tip: Option<ChainTip>,
    /// Next expected mature counter-chain height. Monotonically
    /// non-decreasing except for sanity validation, which may lower it to
    /// retry suspended deposits.
    pub(crate) next_mature_height: u32,
}

/// One federation member's view of the peg: builds, co-signs, tracks and
/// confirms withdrawal transactions, exactly once per deposit.
///
/// All operations are serialized by an internal lock; at most one mutating
/// operation is in flight at any time, and the wallet is only ever touched
/// while that lock is held.
pub struct CrossChainTransferStore {
    pub(crate) db: Arc<dyn TransferDatabase>,
    pub(crate) wallet: Arc<dyn FederationWallet>,
    pub(crate) chain: Arc<dyn ChainIndex>,
    pub(crate) blocks: Arc<dyn BlockRepository>,
    pub(crate) extractor: WithdrawalExtractor,
    pub(crate) config: StoreConfig,
    pub(crate) shutdown: watch::Receiver<bool>,
    inner: Mutex<StoreInner>,
}

impl CrossChainTransferStore {
    pub fn new(
        db: Arc<dyn TransferDatabase>,
        wallet: Arc<dyn FederationWallet>,
        chain: Arc<dyn ChainIndex>,
        blocks: Arc<dyn BlockRepository>,
        config: StoreConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let extractor = WithdrawalExtractor::new(config.multisig_script.clone());
        Self {
            db,
            wallet,
            chain,
            blocks,
            extractor,
            config,
            shutdown,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Reconstructs consistent in-memory state from the database alone:
    /// loads the persisted cursors and rebuilds the indexes from a full
    /// scan. Must be called before any other operation.
    ///
    /// # Panics
    ///
    /// Panics when a persisted record violates the status/block coupling
    /// rule; that is a programmer error with no recovery.
    pub async fn initialize(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.tip = self.db.get_tip()?;
        inner.next_mature_height = self
            .db
            .get_next_mature_height()?
            .unwrap_or(self.config.start_height);

        let transfers = self.db.scan_transfers()?;
        for transfer in &transfers {
            assert!(
                transfer.is_consistent(),
                "corrupt store: transfer {} has status {:?} with block {:?}",
                transfer.deposit_id(),
                transfer.status(),
                transfer.block(),
            );
        }
        inner.indexes = TransferIndexes::rebuild(&transfers);
        inner.initialized = true;
        info!(
            transfers = transfers.len(),
            tip = ?inner.tip,
            next_mature_height = inner.next_mature_height,
            "transfer store initialized"
        );
        Ok(())
    }

    /// Runs an initial synchronization so queries are immediately
    /// consistent with the wallet's tip.
    pub async fn start(&self) -> StoreResult<()> {
        let mut inner = self.lock_initialized().await;
        self.synchronize_locked(&mut inner).await
    }

    /// Flushes the in-memory cursors and the database before shutdown.
    pub async fn dispose(&self) -> StoreResult<()> {
        self.save_current_tip().await?;
        self.wallet.save().await?;
        Ok(())
    }

    /// Persists the next-mature-height cursor.
    pub async fn save_current_tip(&self) -> StoreResult<()> {
        let inner = self.lock_initialized().await;
        let mut batch = TransferWriteBatch::new();
        batch.set_next_mature_height(inner.next_mature_height);
        self.db.commit(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Fetches transfers by deposit id, preserving input order, `None`
    /// where missing. Synchronizes first.
    pub async fn get(&self, ids: &[DepositId]) -> StoreResult<Vec<Option<CrossChainTransfer>>> {
        let mut inner = self.lock_initialized().await;
        self.synchronize_locked(&mut inner).await?;
        ids.iter()
            .map(|id| self.db.get_transfer(id).map_err(Into::into))
            .collect()
    }

    /// Draft withdrawal transactions of every transfer in `status`, sorted
    /// by the canonical coin ordering of their first input. Transfers
    /// without a draft (e.g. suspended ones) are omitted.
    pub async fn get_transactions_by_status(
        &self,
        status: TransferStatus,
    ) -> StoreResult<Vec<(DepositId, Transaction)>> {
        let mut inner = self.lock_initialized().await;
        self.synchronize_locked(&mut inner).await?;

        let mut entries = Vec::new();
        for id in inner.indexes.by_status(status) {
            let Some(transfer) = self.db.get_transfer(&id)? else {
                continue;
            };
            let Some(tx) = transfer
                .partial_transaction()
                .map_err(|_| StoreError::CorruptTransaction(id))?
            else {
                continue;
            };
            entries.push((id, tx));
        }
        entries.sort_by_key(|(_, tx)| {
            tx.input
                .first()
                .map(|input| {
                    (
                        input.previous_output.txid.to_byte_array(),
                        input.previous_output.vout,
                    )
                })
                .unwrap_or(([0; 32], 0))
        });
        Ok(entries)
    }

    /// Whether any transfer currently sits in `Suspended`; the caller
    /// should then re-deliver the mature block once UTXOs free up.
    pub async fn has_suspended(&self) -> bool {
        self.lock_initialized()
            .await
            .indexes
            .has_any(TransferStatus::Suspended)
    }

    /// The next counter-chain height whose mature deposits the store
    /// expects.
    pub async fn next_mature_deposit_height(&self) -> u32 {
        self.lock_initialized().await.next_mature_height
    }

    /// Records one counter-chain block's worth of mature deposits, all at
    /// the expected height, strictly in the order supplied.
    ///
    /// For each deposit a deterministic withdrawal is built and its inputs
    /// reserved in the wallet; failures suspend the deposit and everything
    /// after it in the batch. The cursor only advances when nothing was
    /// suspended, so suspended heights are retried. An empty batch just
    /// advances the cursor.
    pub async fn record_latest_mature_deposits(&self, deposits: &[Deposit]) -> StoreResult<()> {
        let mut inner = self.lock_initialized().await;

        if deposits.is_empty() {
            inner.next_mature_height += 1;
            debug!(
                next_mature_height = inner.next_mature_height,
                "no mature deposits, advanced cursor"
            );
            return Ok(());
        }
        for deposit in deposits {
            if deposit.block_number() != inner.next_mature_height {
                return Err(StoreError::UnexpectedDepositHeight {
                    id: *deposit.id(),
                    got: deposit.block_number(),
                    expected: inner.next_mature_height,
                });
            }
        }

        self.synchronize_locked(&mut inner).await?;
        self.validate_transfers_locked(&mut inner).await?;

        let pre_height = inner.next_mature_height;
        let mut reserved = Vec::new();
        match self.ingest_deposits(&mut inner, deposits, &mut reserved).await {
            Ok(()) => {
                self.wallet.save().await?;
                Ok(())
            }
            Err(e) => {
                // Roll back: free the UTXOs this batch reserved and restore
                // the cursor; the committed state was left untouched.
                for tx in &reserved {
                    if let Err(undo) = self.wallet.remove_transaction(tx).await {
                        error!(%undo, "failed to undo wallet reservation during rollback");
                    }
                }
                inner.next_mature_height = pre_height;
                Err(e)
            }
        }
    }

    async fn ingest_deposits(
        &self,
        inner: &mut StoreInner,
        deposits: &[Deposit],
        reserved: &mut Vec<Transaction>,
    ) -> StoreResult<()> {
        // The whole batch matured at one height (checked on entry, before
        // sanity validation possibly lowered the cursor).
        let height = deposits[0].block_number();
        let mut batch = TransferWriteBatch::new();
        let mut tracker = StatusTracker::new();
        let mut have_suspended = false;

        for deposit in deposits {
            let existing = self.db.get_transfer(deposit.id())?;
            if let Some(transfer) = &existing {
                if transfer.status() != TransferStatus::Suspended {
                    debug!(deposit_id = %deposit.id(), status = ?transfer.status(), "deposit already handled");
                    continue;
                }
            }

            // A deposit that cannot cover the flat fee can never be
            // withdrawn; record it as rejected and move on.
            if existing.is_none() && deposit.amount() <= self.config.transaction_fee {
                warn!(deposit_id = %deposit.id(), amount = %deposit.amount(), "deposit cannot cover withdrawal fee, rejecting");
                let rejected = CrossChainTransfer::new_rejected(
                    *deposit.id(),
                    deposit.block_number(),
                    deposit.amount(),
                    deposit.target_script(),
                );
                tracker.record_new(rejected.clone());
                batch.put_transfer(rejected);
                continue;
            }

            // Strict in-order processing: once one deposit suspends, the
            // rest of the batch suspends with it.
            let built = if have_suspended {
                None
            } else {
                self.try_build_and_reserve(deposit, reserved).await?
            };

            match built {
                Some(tx) => match existing {
                    Some(mut transfer) => {
                        let old_status = transfer.status();
                        transfer.set_partial(&tx);
                        tracker.record_change(transfer.clone(), old_status, None);
                        batch.put_transfer(transfer);
                    }
                    None => {
                        let transfer = CrossChainTransfer::new_partial(
                            *deposit.id(),
                            deposit.block_number(),
                            deposit.amount(),
                            deposit.target_script(),
                            &tx,
                        );
                        tracker.record_new(transfer.clone());
                        batch.put_transfer(transfer);
                    }
                },
                None => {
                    have_suspended = true;
                    if existing.is_none() {
                        debug!(deposit_id = %deposit.id(), "could not build withdrawal, suspending");
                        let transfer = CrossChainTransfer::new_suspended(
                            *deposit.id(),
                            deposit.block_number(),
                            deposit.amount(),
                            deposit.target_script(),
                        );
                        tracker.record_new(transfer.clone());
                        batch.put_transfer(transfer);
                    }
                }
            }
        }

        // Advance only when the cursor still points at this batch; sanity
        // validation may have lowered it to retry an earlier height, and
        // that retry must not be skipped.
        if !have_suspended && inner.next_mature_height == height {
            inner.next_mature_height = height + 1;
            batch.set_next_mature_height(inner.next_mature_height);
        }

        self.db.commit(batch)?;
        tracker.apply(&mut inner.indexes);
        info!(
            height,
            deposits = deposits.len(),
            suspended = have_suspended,
            "recorded mature deposit batch"
        );
        Ok(())
    }

    async fn try_build_and_reserve(
        &self,
        deposit: &Deposit,
        reserved: &mut Vec<Transaction>,
    ) -> StoreResult<Option<Transaction>> {
        let outputs = self.wallet.multisig_outputs().await?;
        let Some(unsigned) = build_deterministic_withdrawal(
            &outputs,
            &self.config,
            deposit.id(),
            deposit.target_script(),
            deposit.amount(),
        ) else {
            return Ok(None);
        };

        // Sign right away if the wallet password is available; otherwise
        // the unsigned draft is stored and signed at merge time.
        let tx = self
            .wallet
            .sign_transaction(unsigned.clone())
            .await?
            .unwrap_or(unsigned);

        // Failing to reserve the inputs is a build failure.
        if !self.wallet.process_transaction(&tx).await? {
            return Ok(None);
        }
        reserved.push(tx.clone());
        Ok(Some(tx))
    }

    /// Merges sibling federation members' partial signatures into a
    /// transfer's draft withdrawal. Unknown deposit → `None`; transfer not
    /// in `Partial` → its current draft, unchanged. Promotes the transfer
    /// to `FullySigned` once the merged transaction verifies completely.
    pub async fn merge_transaction_signatures(
        &self,
        deposit_id: &DepositId,
        partials: &[Transaction],
    ) -> StoreResult<Option<Transaction>> {
        let mut inner = self.lock_initialized().await;
        self.synchronize_locked(&mut inner).await?;

        let Some(transfer) = self.db.get_transfer(deposit_id)? else {
            debug!(%deposit_id, "merge requested for unknown deposit");
            return Ok(None);
        };
        if transfer.status() != TransferStatus::Partial {
            debug!(%deposit_id, status = ?transfer.status(), "merge requested for non-partial transfer");
            return transfer
                .partial_transaction()
                .map_err(|_| StoreError::CorruptTransaction(*deposit_id));
        }

        let old_tx = transfer
            .partial_transaction()
            .map_err(|_| StoreError::CorruptTransaction(*deposit_id))?
            .ok_or(StoreError::MissingPartialTransaction(*deposit_id))?;
        let old_txid = old_tx.compute_txid();

        let merged = self.wallet.combine_signatures(&old_tx, partials).await?;
        if merged.compute_txid() == old_txid {
            // Nothing new was contributed; commit nothing.
            return Ok(Some(old_tx));
        }

        self.wallet.update_transaction(&old_txid, &merged).await?;

        match self.persist_merged(&mut inner, transfer, &merged).await {
            Ok(()) => {
                self.wallet.save().await?;
                Ok(Some(merged))
            }
            Err(e) => {
                let merged_txid = merged.compute_txid();
                if let Err(undo) = self.wallet.update_transaction(&merged_txid, &old_tx).await {
                    error!(%undo, "failed to revert wallet spending details during rollback");
                }
                Err(e)
            }
        }
    }

    async fn persist_merged(
        &self,
        inner: &mut StoreInner,
        mut transfer: CrossChainTransfer,
        merged: &Transaction,
    ) -> StoreResult<()> {
        let old_status = transfer.status();
        if self.is_fully_signed(merged).await? {
            transfer.set_fully_signed(merged);
            info!(
                deposit_id = %transfer.deposit_id(),
                txid = %merged.compute_txid(),
                "withdrawal fully signed"
            );
        } else {
            transfer.set_partial(merged);
        }

        let mut batch = TransferWriteBatch::new();
        let mut tracker = StatusTracker::new();
        tracker.record_change(transfer.clone(), old_status, None);
        batch.put_transfer(transfer);
        self.db.commit(batch)?;
        tracker.apply(&mut inner.indexes);
        Ok(())
    }

    /// Acceptance check of a candidate withdrawal: every input must
    /// be reserved in the wallet for exactly this transaction, the fee
    /// floor must be met, and every input's script must verify.
    async fn is_fully_signed(&self, tx: &Transaction) -> StoreResult<bool> {
        let outputs = self.wallet.multisig_outputs().await?;
        let Some(spent) = validation::collect_spent_coins(tx, &outputs) else {
            return Ok(false);
        };
        if !validation::meets_fee_policy(tx, &spent, self.config.minimum_fee) {
            return Ok(false);
        }
        self.wallet.verify_signatures(tx, &spent).await
    }

    /// Sanity revalidation: every `Partial` or `FullySigned` transfer must
    /// still have all of its draft's inputs reserved for it in the wallet.
    /// Violators are suspended, their drafts removed from the wallet, and
    /// the mature-height cursor lowered to the lowest suspended deposit
    /// height so those deposits are retried. This is the only operation
    /// that may decrease the cursor.
    pub(crate) async fn validate_transfers_locked(
        &self,
        inner: &mut StoreInner,
    ) -> StoreResult<()> {
        let mut ids = inner.indexes.by_status(TransferStatus::Partial);
        ids.extend(inner.indexes.by_status(TransferStatus::FullySigned));
        if ids.is_empty() {
            return Ok(());
        }

        let outputs = self.wallet.multisig_outputs().await?;
        let mut batch = TransferWriteBatch::new();
        let mut tracker = StatusTracker::new();
        let mut to_remove = Vec::new();
        let mut floor = inner.next_mature_height;

        for id in ids {
            let Some(mut transfer) = self.db.get_transfer(&id)? else {
                continue;
            };
            let tx = transfer
                .partial_transaction()
                .map_err(|_| StoreError::CorruptTransaction(id))?;
            let still_reserved = tx
                .as_ref()
                .is_some_and(|tx| validation::collect_spent_coins(tx, &outputs).is_some());
            if still_reserved {
                continue;
            }

            warn!(deposit_id = %id, status = ?transfer.status(), "withdrawal inputs no longer reserved, suspending");
            let old_status = transfer.status();
            if let Some(height) = transfer.deposit_height() {
                floor = floor.min(height);
            }
            transfer.suspend();
            tracker.record_change(transfer.clone(), old_status, None);
            batch.put_transfer(transfer);
            if let Some(tx) = tx {
                to_remove.push(tx);
            }
        }

        if tracker.is_empty() {
            return Ok(());
        }
        if floor < inner.next_mature_height {
            batch.set_next_mature_height(floor);
        }

        self.db.commit(batch)?;
        tracker.apply(&mut inner.indexes);
        inner.next_mature_height = floor;
        for tx in &to_remove {
            self.wallet.remove_transaction(tx).await?;
        }
        self.wallet.save().await?;
        Ok(())
    }

    pub(crate) async fn lock_initialized(&self) -> MutexGuard<'_, StoreInner> {
        let inner = self.inner.lock().await;
        assert!(inner.initialized, "transfer store used before initialize()");
        inner
    }
}

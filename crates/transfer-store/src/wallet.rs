//! Contract with the federation multisig wallet.
//!
//! The wallet owns keys, the multisig UTXO set and the signing primitive;
//! the store drives it. Every method here is only ever invoked while the
//! store's lock is held, so wallet mutations never race store mutations.

use async_trait::async_trait;
use bitcoin::{Amount, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use fedpeg_primitives::ChainTip;

use crate::errors::StoreResult;

/// One output of the federation multisig, with its reservation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableOutput {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
    pub confirmations: u32,
    /// Id of the withdrawal transaction this output is reserved for, if
    /// any. A reserved output is spent from the wallet's point of view.
    pub spent_by: Option<Txid>,
}

impl SpendableOutput {
    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

/// The multisig wallet as consumed by the transfer store.
#[async_trait]
pub trait FederationWallet: Send + Sync + 'static {
    /// The wallet's last synced block on this chain. Authoritative: the
    /// store never advances past it and reorgs to follow it.
    async fn tip_to_chase(&self) -> StoreResult<ChainTip>;

    /// Snapshot of the multisig output set with reservation details.
    async fn multisig_outputs(&self) -> StoreResult<Vec<SpendableOutput>>;

    /// Atomically reserve the transaction's inputs as spent by it. Returns
    /// `false` when any input is unknown or already reserved.
    async fn process_transaction(&self, tx: &Transaction) -> StoreResult<bool>;

    /// Move reservations from a superseded draft to its replacement after
    /// a signature merge changed the transaction id.
    async fn update_transaction(&self, old_txid: &Txid, tx: &Transaction) -> StoreResult<bool>;

    /// Undo a reservation made by [`process_transaction`].
    ///
    /// [`process_transaction`]: FederationWallet::process_transaction
    async fn remove_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    /// Sign the transaction's inputs with this member's key. Returns
    /// `None` when the wallet password is not available; the unsigned
    /// transaction is then stored and signed later.
    async fn sign_transaction(&self, tx: Transaction) -> StoreResult<Option<Transaction>>;

    /// Merge the signatures of sibling drafts into `tx`, input-wise.
    /// Duplicate signatures are idempotent.
    async fn combine_signatures(
        &self,
        tx: &Transaction,
        partials: &[Transaction],
    ) -> StoreResult<Transaction>;

    /// Script-verify each input of `tx` against the coins it spends.
    async fn verify_signatures(&self, tx: &Transaction, spent: &[TxOut]) -> StoreResult<bool>;

    /// Block locator of the wallet's current chain, densest near its tip.
    async fn block_locator(&self) -> StoreResult<Vec<BlockHash>>;

    /// Rewind the wallet to `fork`; `None` rewinds to genesis.
    async fn remove_blocks(&self, fork: Option<ChainTip>) -> StoreResult<()>;

    /// Persist the wallet's state.
    async fn save(&self) -> StoreResult<()>;
}

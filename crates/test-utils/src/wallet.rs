//! In-memory federation wallet with a toy multi-signature scheme.
//!
//! A member's "signature" on an input is its member byte appearing in the
//! input's script_sig; combining drafts unions the bytes and a transaction
//! verifies once every input carries at least `threshold` distinct bytes.
//! That is enough to exercise the store's signature merge and validation
//! paths deterministically.

use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::{hashes::Hash, Amount, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use fedpeg_primitives::ChainTip;
use fedpeg_transfer_store::{FederationWallet, SpendableOutput, StoreError, StoreResult};

#[derive(Debug, Default)]
struct WalletState {
    tip: Option<ChainTip>,
    outputs: Vec<SpendableOutput>,
    has_password: bool,
    locator: Vec<BlockHash>,
    rewinds: Vec<Option<ChainTip>>,
    saves: usize,
}

/// One federation member's wallet view.
#[derive(Debug)]
pub struct MockFederationWallet {
    member_id: u8,
    threshold: usize,
    state: Mutex<WalletState>,
}

fn with_signature(script_sig: &ScriptBuf, member: u8) -> ScriptBuf {
    let mut bytes = script_sig.to_bytes();
    if !bytes.contains(&member) {
        bytes.push(member);
        bytes.sort_unstable();
    }
    ScriptBuf::from_bytes(bytes)
}

impl MockFederationWallet {
    pub fn new(member_id: u8, threshold: usize) -> Self {
        Self {
            member_id,
            threshold,
            state: Mutex::new(WalletState {
                has_password: true,
                ..WalletState::default()
            }),
        }
    }

    pub fn set_tip(&self, tip: ChainTip) {
        self.state.lock().unwrap().tip = Some(tip);
    }

    pub fn set_password_available(&self, available: bool) {
        self.state.lock().unwrap().has_password = available;
    }

    pub fn set_locator(&self, locator: Vec<BlockHash>) {
        self.state.lock().unwrap().locator = locator;
    }

    pub fn add_output(&self, txid_byte: u8, vout: u32, sats: u64, confirmations: u32) {
        self.state.lock().unwrap().outputs.push(SpendableOutput {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([txid_byte; 32]),
                vout,
            },
            value: Amount::from_sat(sats),
            script_pubkey: ScriptBuf::new(),
            confirmations,
            spent_by: None,
        });
    }

    /// Clears a reservation directly, simulating the UTXO being taken by
    /// something outside the store.
    pub fn steal_reservation(&self, txid: &Txid) {
        for out in &mut self.state.lock().unwrap().outputs {
            if out.spent_by == Some(*txid) {
                out.spent_by = Some(Txid::from_byte_array([0xfe; 32]));
            }
        }
    }

    pub fn outputs(&self) -> Vec<SpendableOutput> {
        self.state.lock().unwrap().outputs.clone()
    }

    pub fn reserved_for(&self, txid: &Txid) -> usize {
        self.state
            .lock()
            .unwrap()
            .outputs
            .iter()
            .filter(|out| out.spent_by == Some(*txid))
            .count()
    }

    pub fn rewind_calls(&self) -> Vec<Option<ChainTip>> {
        self.state.lock().unwrap().rewinds.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    /// A sibling member's partial signature over the same draft.
    pub fn sibling_signature(tx: &Transaction, member: u8) -> Transaction {
        let mut signed = tx.clone();
        for input in &mut signed.input {
            input.script_sig = with_signature(&input.script_sig, member);
        }
        signed
    }
}

#[async_trait]
impl FederationWallet for MockFederationWallet {
    async fn tip_to_chase(&self) -> StoreResult<ChainTip> {
        self.state
            .lock()
            .unwrap()
            .tip
            .ok_or_else(|| StoreError::Wallet("wallet tip not set".into()))
    }

    async fn multisig_outputs(&self) -> StoreResult<Vec<SpendableOutput>> {
        Ok(self.state.lock().unwrap().outputs.clone())
    }

    async fn process_transaction(&self, tx: &Transaction) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let txid = tx.compute_txid();

        for input in &tx.input {
            let known = state.outputs.iter().any(|out| {
                out.outpoint == input.previous_output
                    && (out.spent_by.is_none() || out.spent_by == Some(txid))
            });
            if !known {
                return Ok(false);
            }
        }
        for input in &tx.input {
            for out in &mut state.outputs {
                if out.outpoint == input.previous_output {
                    out.spent_by = Some(txid);
                }
            }
        }
        Ok(true)
    }

    async fn update_transaction(&self, old_txid: &Txid, tx: &Transaction) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let new_txid = tx.compute_txid();
        let mut updated = false;
        for out in &mut state.outputs {
            if out.spent_by == Some(*old_txid) {
                out.spent_by = Some(new_txid);
                updated = true;
            }
        }
        Ok(updated)
    }

    async fn remove_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let txid = tx.compute_txid();
        for out in &mut state.outputs {
            if out.spent_by == Some(txid) {
                out.spent_by = None;
            }
        }
        Ok(())
    }

    async fn sign_transaction(&self, tx: Transaction) -> StoreResult<Option<Transaction>> {
        if !self.state.lock().unwrap().has_password {
            return Ok(None);
        }
        Ok(Some(Self::sibling_signature(&tx, self.member_id)))
    }

    async fn combine_signatures(
        &self,
        tx: &Transaction,
        partials: &[Transaction],
    ) -> StoreResult<Transaction> {
        let mut merged = tx.clone();
        for (index, input) in merged.input.iter_mut().enumerate() {
            let mut bytes = input.script_sig.to_bytes();
            for partial in partials {
                if let Some(sibling) = partial.input.get(index) {
                    bytes.extend(sibling.script_sig.to_bytes());
                }
            }
            bytes.sort_unstable();
            bytes.dedup();
            input.script_sig = ScriptBuf::from_bytes(bytes);
        }
        Ok(merged)
    }

    async fn verify_signatures(&self, tx: &Transaction, spent: &[TxOut]) -> StoreResult<bool> {
        if spent.len() != tx.input.len() {
            return Ok(false);
        }
        Ok(tx
            .input
            .iter()
            .all(|input| input.script_sig.to_bytes().len() >= self.threshold))
    }

    async fn block_locator(&self) -> StoreResult<Vec<BlockHash>> {
        Ok(self.state.lock().unwrap().locator.clone())
    }

    async fn remove_blocks(&self, fork: Option<ChainTip>) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.tip = fork;
        state.rewinds.push(fork);
        Ok(())
    }

    async fn save(&self) -> StoreResult<()> {
        self.state.lock().unwrap().saves += 1;
        Ok(())
    }
}

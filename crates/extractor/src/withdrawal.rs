use bitcoin::{Block, ScriptBuf, Transaction};
use fedpeg_primitives::{Buf32, DepositId, Withdrawal};
use tracing::debug;

use crate::op_return_payload;

/// Scans this chain's blocks for withdrawals released by the federation.
///
/// A transaction is a withdrawal when it carries an `OP_RETURN` push of
/// exactly 32 bytes, the id of the deposit it fulfils. The target output
/// is the first output that is neither the tag nor change back to the
/// federation multisig.
#[derive(Debug, Clone)]
pub struct WithdrawalExtractor {
    multisig_script: ScriptBuf,
}

impl WithdrawalExtractor {
    pub fn new(multisig_script: ScriptBuf) -> Self {
        Self { multisig_script }
    }

    pub fn extract_from_block(&self, block: &Block, height: u32) -> Vec<Withdrawal> {
        let withdrawals: Vec<_> = block
            .txdata
            .iter()
            .filter_map(|tx| self.extract_from_tx(tx))
            .collect();
        if !withdrawals.is_empty() {
            debug!(%height, count = withdrawals.len(), "extracted withdrawals");
        }
        withdrawals
    }

    fn extract_from_tx(&self, tx: &Transaction) -> Option<Withdrawal> {
        let deposit_id = tx.output.iter().find_map(|out| {
            let payload = op_return_payload(&out.script_pubkey)?;
            let bytes: [u8; 32] = payload.try_into().ok()?;
            Some(DepositId::new(Buf32::from(bytes)))
        })?;

        let target = tx.output.iter().find(|out| {
            !out.script_pubkey.is_op_return() && out.script_pubkey != self.multisig_script
        })?;

        Some(Withdrawal::new(
            tx.compute_txid(),
            deposit_id,
            target.script_pubkey.clone(),
            target.value,
        ))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{script::Builder, Amount};

    use super::*;
    use crate::test_utils::{block_with, tx_with_outputs};

    fn multisig() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0x51, 0x52])
    }

    fn tag(deposit_id: [u8; 32]) -> ScriptBuf {
        Builder::new()
            .push_opcode(bitcoin::opcodes::all::OP_RETURN)
            .push_slice(deposit_id)
            .into_script()
    }

    #[test]
    fn test_extracts_withdrawal() {
        let extractor = WithdrawalExtractor::new(multisig());
        let target = ScriptBuf::from_bytes(vec![0x77]);
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(24_000), target.clone()),
            (Amount::from_sat(1_000), multisig()),
            (Amount::ZERO, tag([5; 32])),
        ]);
        let txid = tx.compute_txid();

        let withdrawals = extractor.extract_from_block(&block_with(vec![tx]), 42);
        assert_eq!(withdrawals.len(), 1);
        let w = &withdrawals[0];
        assert_eq!(*w.id(), txid);
        assert_eq!(*w.deposit_id(), DepositId::new(Buf32::from([5; 32])));
        assert_eq!(w.target_script(), &target);
        assert_eq!(w.amount(), Amount::from_sat(24_000));
    }

    #[test]
    fn test_ignores_wrong_tag_length() {
        let extractor = WithdrawalExtractor::new(multisig());
        let short_tag = Builder::new()
            .push_opcode(bitcoin::opcodes::all::OP_RETURN)
            .push_slice(b"too-short")
            .into_script();
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(24_000), ScriptBuf::from_bytes(vec![0x77])),
            (Amount::ZERO, short_tag),
        ]);
        assert!(extractor.extract_from_block(&block_with(vec![tx]), 42).is_empty());
    }

    #[test]
    fn test_ignores_change_only_tx() {
        let extractor = WithdrawalExtractor::new(multisig());
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(1_000), multisig()),
            (Amount::ZERO, tag([5; 32])),
        ]);
        assert!(extractor.extract_from_block(&block_with(vec![tx]), 42).is_empty());
    }
}

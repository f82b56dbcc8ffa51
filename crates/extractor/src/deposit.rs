use bitcoin::{Amount, Block, ScriptBuf, Transaction};
use fedpeg_primitives::Deposit;
use tracing::debug;

use crate::op_return_payload;

/// Scans counter-chain blocks for deposits to the federation.
///
/// A transaction deposits when it pays the federation multisig script and
/// carries an `OP_RETURN` push with the target script for this chain. The
/// deposit id is the transaction's own id.
#[derive(Debug, Clone)]
pub struct DepositExtractor {
    multisig_script: ScriptBuf,
}

impl DepositExtractor {
    pub fn new(multisig_script: ScriptBuf) -> Self {
        Self { multisig_script }
    }

    pub fn extract_from_block(&self, block: &Block, height: u32) -> Vec<Deposit> {
        let deposits: Vec<_> = block
            .txdata
            .iter()
            .filter_map(|tx| self.extract_from_tx(tx, height))
            .collect();
        if !deposits.is_empty() {
            debug!(%height, count = deposits.len(), "extracted mature deposits");
        }
        deposits
    }

    fn extract_from_tx(&self, tx: &Transaction, height: u32) -> Option<Deposit> {
        let paid: Amount = tx
            .output
            .iter()
            .filter(|out| out.script_pubkey == self.multisig_script)
            .map(|out| out.value)
            .sum();
        if paid == Amount::ZERO {
            return None;
        }

        // The tag names where the funds should be released on this chain.
        let target = tx
            .output
            .iter()
            .find_map(|out| op_return_payload(&out.script_pubkey))
            .filter(|payload| !payload.is_empty())?;

        Some(Deposit::new(
            tx.compute_txid().into(),
            ScriptBuf::from_bytes(target),
            paid,
            height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::script::Builder;

    use super::*;
    use crate::test_utils::{block_with, tx_with_outputs};

    fn multisig() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0x51, 0x52])
    }

    fn tagged(target: &[u8; 4]) -> ScriptBuf {
        Builder::new()
            .push_opcode(bitcoin::opcodes::all::OP_RETURN)
            .push_slice(target)
            .into_script()
    }

    #[test]
    fn test_extracts_tagged_payment() {
        let extractor = DepositExtractor::new(multisig());
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(25_000), multisig()),
            (Amount::ZERO, tagged(b"dest")),
        ]);
        let txid = tx.compute_txid();

        let deposits = extractor.extract_from_block(&block_with(vec![tx]), 10);
        assert_eq!(deposits.len(), 1);
        let d = &deposits[0];
        assert_eq!(*d.id(), txid.into());
        assert_eq!(d.amount(), Amount::from_sat(25_000));
        assert_eq!(d.target_script().as_bytes(), b"dest");
        assert_eq!(d.block_number(), 10);
    }

    #[test]
    fn test_ignores_untagged_payment() {
        let extractor = DepositExtractor::new(multisig());
        let tx = tx_with_outputs(vec![(Amount::from_sat(25_000), multisig())]);
        assert!(extractor.extract_from_block(&block_with(vec![tx]), 10).is_empty());
    }

    #[test]
    fn test_ignores_unrelated_tx() {
        let extractor = DepositExtractor::new(multisig());
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(25_000), ScriptBuf::from_bytes(vec![0x99])),
            (Amount::ZERO, tagged(b"dest")),
        ]);
        assert!(extractor.extract_from_block(&block_with(vec![tx]), 10).is_empty());
    }

    #[test]
    fn test_sums_multiple_multisig_outputs() {
        let extractor = DepositExtractor::new(multisig());
        let tx = tx_with_outputs(vec![
            (Amount::from_sat(10_000), multisig()),
            (Amount::from_sat(15_000), multisig()),
            (Amount::ZERO, tagged(b"dest")),
        ]);
        let deposits = extractor.extract_from_block(&block_with(vec![tx]), 3);
        assert_eq!(deposits[0].amount(), Amount::from_sat(25_000));
    }
}

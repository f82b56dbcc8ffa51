//! Per-block scanning primitives for the federated peg.
//!
//! Both directions of the peg tag their transactions with an `OP_RETURN`
//! output: deposits carry the target script for the other chain,
//! withdrawals carry the 32-byte id of the deposit they fulfil. These
//! extractors walk a block's transactions and pull out the tagged ones;
//! they do no validation beyond shape, that is the store's job.

pub mod deposit;
pub mod withdrawal;

use bitcoin::script::Instruction;
use bitcoin::Script;

pub use deposit::DepositExtractor;
pub use withdrawal::WithdrawalExtractor;

/// Returns the single data push of an `OP_RETURN` script, if the script
/// has exactly that shape.
pub(crate) fn op_return_payload(script: &Script) -> Option<Vec<u8>> {
    let mut instructions = script.instructions();
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == bitcoin::opcodes::all::OP_RETURN => {}
        _ => return None,
    }
    let payload = match instructions.next() {
        Some(Ok(Instruction::PushBytes(push))) => push.as_bytes().to_vec(),
        _ => return None,
    };
    match instructions.next() {
        None => Some(payload),
        Some(_) => None,
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use bitcoin::{
        absolute::LockTime, block, hashes::Hash, transaction::Version, Amount, Block, BlockHash,
        CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode, TxOut,
        Witness,
    };

    pub(crate) fn block_with(txdata: Vec<Transaction>) -> Block {
        Block {
            header: block::Header {
                version: block::Version::ONE,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: 0,
                bits: CompactTarget::from_consensus(0x207fffff),
                nonce: 0,
            },
            txdata,
        }
    }

    pub(crate) fn tx_with_outputs(outputs: Vec<(Amount, ScriptBuf)>) -> Transaction {
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs
                .into_iter()
                .map(|(value, script_pubkey)| TxOut {
                    value,
                    script_pubkey,
                })
                .collect(),
        }
    }
}

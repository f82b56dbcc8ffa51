//! Deterministic withdrawal transaction construction.
//!
//! Every federation member must produce the exact same unsigned bytes for a
//! given deposit and wallet UTXO set, so the partial transactions gossiped
//! between members merge into one multi-signed transaction. Determinism
//! rules: coins are selected in canonical `(txid, vout)` order, nothing is
//! shuffled, the output order is fixed, and the fee is a configured flat
//! amount.

use bitcoin::{
    absolute::LockTime, hashes::Hash, script::Builder, transaction::Version, Amount, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Witness,
};
use fedpeg_primitives::DepositId;

use crate::{config::StoreConfig, wallet::SpendableOutput};

/// Builds the canonical unsigned withdrawal for a deposit, or `None` when
/// the wallet lacks sufficient mature, unreserved funds. The recipient
/// bears the flat fee: the payment output carries `amount - fee` and the
/// change output returns `sum(inputs) - amount` to the multisig.
pub fn build_deterministic_withdrawal(
    outputs: &[SpendableOutput],
    config: &StoreConfig,
    deposit_id: &DepositId,
    target_script: &ScriptBuf,
    amount: Amount,
) -> Option<Transaction> {
    let payment = amount.checked_sub(config.transaction_fee)?;
    if payment == Amount::ZERO {
        return None;
    }

    let mut candidates: Vec<&SpendableOutput> = outputs
        .iter()
        .filter(|out| out.spent_by.is_none() && out.confirmations >= config.min_coin_maturity)
        .collect();
    candidates.sort_by_key(|out| (out.outpoint.txid.to_byte_array(), out.outpoint.vout));

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;
    for out in candidates {
        selected.push(out);
        total = total.checked_add(out.value)?;
        if total >= amount {
            break;
        }
    }
    if total < amount {
        return None;
    }

    let input = selected
        .iter()
        .map(|out| TxIn {
            previous_output: out.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();

    let op_return = Builder::new()
        .push_opcode(bitcoin::opcodes::all::OP_RETURN)
        .push_slice(*deposit_id.as_bytes())
        .into_script();

    let output = vec![
        TxOut {
            value: payment,
            script_pubkey: target_script.clone(),
        },
        TxOut {
            value: total - amount,
            script_pubkey: config.multisig_script.clone(),
        },
        TxOut {
            value: Amount::ZERO,
            script_pubkey: op_return,
        },
    ];

    Some(Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

//! Checks applied to a candidate fully-signed withdrawal.

use std::collections::HashMap;

use bitcoin::{Amount, OutPoint, Transaction, TxOut};

use crate::wallet::SpendableOutput;

/// Resolves the coins a transaction spends from the multisig output set,
/// requiring each input to be reserved for exactly this transaction.
/// Returns `None` when any input is missing or reserved for another
/// transaction.
pub(crate) fn collect_spent_coins(
    tx: &Transaction,
    outputs: &[SpendableOutput],
) -> Option<Vec<TxOut>> {
    let by_outpoint: HashMap<OutPoint, &SpendableOutput> =
        outputs.iter().map(|out| (out.outpoint, out)).collect();
    let txid = tx.compute_txid();

    tx.input
        .iter()
        .map(|input| {
            let out = by_outpoint.get(&input.previous_output)?;
            (out.spent_by == Some(txid)).then(|| out.tx_out())
        })
        .collect()
}

/// Fee policy: the transaction must pay at least `minimum_fee` out of the
/// coins it spends.
pub(crate) fn meets_fee_policy(tx: &Transaction, spent: &[TxOut], minimum_fee: Amount) -> bool {
    let total_in: Amount = spent.iter().map(|out| out.value).sum();
    let total_out: Amount = tx.output.iter().map(|out| out.value).sum();
    match total_in.checked_sub(total_out) {
        Some(fee) => fee >= minimum_fee,
        None => false,
    }
}

use bitcoin::{Amount, ScriptBuf};

/// Static parameters of one peg's transfer store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// The N-of-M output script controlling pegged funds on this chain.
    /// Coin selection, change and withdrawal detection all key off it.
    pub multisig_script: ScriptBuf,

    /// Flat fee of every withdrawal transaction, borne by the recipient.
    pub transaction_fee: Amount,

    /// Fee floor a fully signed withdrawal must clear to be accepted.
    pub minimum_fee: Amount,

    /// Confirmations a multisig UTXO needs before it may fund a
    /// withdrawal.
    pub min_coin_maturity: u32,

    /// Counter-chain height the peg starts watching from; seeds the
    /// next-mature-height cursor on a fresh data directory.
    pub start_height: u32,

    /// Local-chain blocks consumed per synchronizer iteration.
    pub sync_batch_size: usize,
}

impl StoreConfig {
    pub fn new(multisig_script: ScriptBuf, transaction_fee: Amount) -> Self {
        Self {
            multisig_script,
            transaction_fee,
            minimum_fee: transaction_fee,
            min_coin_maturity: 1,
            start_height: 0,
            sync_batch_size: 100,
        }
    }
}

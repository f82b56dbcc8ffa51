use bitcoin::{Amount, ScriptBuf, Txid};

use crate::deposit::DepositId;

/// A withdrawal observed in a block on this chain.
///
/// Produced by scanning blocks for transactions tagged with a deposit id;
/// `id` is the withdrawal transaction's own id on this chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Withdrawal {
    id: Txid,
    deposit_id: DepositId,
    target_script: ScriptBuf,
    amount: Amount,
}

impl Withdrawal {
    pub fn new(id: Txid, deposit_id: DepositId, target_script: ScriptBuf, amount: Amount) -> Self {
        Self {
            id,
            deposit_id,
            target_script,
            amount,
        }
    }

    pub const fn id(&self) -> &Txid {
        &self.id
    }

    pub const fn deposit_id(&self) -> &DepositId {
        &self.deposit_id
    }

    pub fn target_script(&self) -> &ScriptBuf {
        &self.target_script
    }

    pub const fn amount(&self) -> Amount {
        self.amount
    }
}

//! Persisted types for cross-chain transfers.

use arbitrary::Arbitrary;
use bitcoin::{
    consensus::{self, deserialize, serialize},
    Amount, ScriptBuf, Transaction,
};
use borsh::{BorshDeserialize, BorshSerialize};
use fedpeg_primitives::{BlockLocation, ChainTip, DepositId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a cross-chain transfer.
///
/// ```text
/// Suspended ⇄ Partial → FullySigned → SeenInBlock
///                ▲            ▲             │
///                └────────────┴─────────────┘  (reorg)
/// ```
///
/// `Rejected` is terminal: the deposit can never be withdrawn (its amount
/// does not cover the withdrawal fee). A reorg moves `SeenInBlock` back to
/// `FullySigned`; transfers without a recorded deposit height are deleted
/// instead since they cannot be rebuilt locally.
///
/// The borsh discriminant of each variant is part of the on-disk record
/// layout; variants must not be reordered.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Arbitrary,
    Serialize,
    Deserialize,
)]
pub enum TransferStatus {
    /// No usable withdrawal transaction; waiting for UTXOs to free up.
    Suspended,
    /// A deterministic withdrawal transaction exists, not yet fully signed.
    Partial,
    /// All required federation signatures are present and verified.
    FullySigned,
    /// The withdrawal transaction was observed in a block on this chain.
    SeenInBlock,
    /// The deposit can never be withdrawn; terminal.
    Rejected,
}

impl TransferStatus {
    /// All statuses, in discriminant order.
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Suspended,
        TransferStatus::Partial,
        TransferStatus::FullySigned,
        TransferStatus::SeenInBlock,
        TransferStatus::Rejected,
    ];
}

/// One pegged transfer: a counter-chain deposit and the withdrawal
/// transaction releasing the equivalent funds on this chain.
///
/// Field order is the persisted record layout:
/// `(status:u8, deposit_id:32, deposit_height:opt<i32le>, amount:i64le,
/// target_script:varbytes, partial_tx:opt<varbytes>,
/// block:opt<(hash:32, height:i32le)>)` where options are a `u8` presence
/// flag and varbytes are a `u32le` length prefix. Reordering fields breaks
/// every existing data directory.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub struct CrossChainTransfer {
    status: TransferStatus,
    deposit_id: DepositId,
    deposit_height: Option<u32>,
    amount: u64,
    target_script: Vec<u8>,
    partial_tx: Option<Vec<u8>>,
    block: Option<BlockLocation>,
}

impl CrossChainTransfer {
    /// A transfer with a built (possibly unsigned) withdrawal transaction.
    pub fn new_partial(
        deposit_id: DepositId,
        deposit_height: u32,
        amount: Amount,
        target_script: &ScriptBuf,
        tx: &Transaction,
    ) -> Self {
        Self {
            status: TransferStatus::Partial,
            deposit_id,
            deposit_height: Some(deposit_height),
            amount: amount.to_sat(),
            target_script: target_script.to_bytes(),
            partial_tx: Some(serialize(tx)),
            block: None,
        }
    }

    /// A transfer we could not build a withdrawal for yet.
    pub fn new_suspended(
        deposit_id: DepositId,
        deposit_height: u32,
        amount: Amount,
        target_script: &ScriptBuf,
    ) -> Self {
        Self {
            status: TransferStatus::Suspended,
            deposit_id,
            deposit_height: Some(deposit_height),
            amount: amount.to_sat(),
            target_script: target_script.to_bytes(),
            partial_tx: None,
            block: None,
        }
    }

    /// A transfer that can never be withdrawn.
    pub fn new_rejected(
        deposit_id: DepositId,
        deposit_height: u32,
        amount: Amount,
        target_script: &ScriptBuf,
    ) -> Self {
        Self {
            status: TransferStatus::Rejected,
            deposit_id,
            deposit_height: Some(deposit_height),
            amount: amount.to_sat(),
            target_script: target_script.to_bytes(),
            partial_tx: None,
            block: None,
        }
    }

    /// A transfer first observed as a withdrawal in one of our own blocks.
    /// We have no record of the originating deposit, so `deposit_height`
    /// is absent; such transfers are deleted outright on reorg.
    pub fn new_seen_in_block(
        deposit_id: DepositId,
        amount: Amount,
        target_script: &ScriptBuf,
        tx: &Transaction,
        block: BlockLocation,
    ) -> Self {
        Self {
            status: TransferStatus::SeenInBlock,
            deposit_id,
            deposit_height: None,
            amount: amount.to_sat(),
            target_script: target_script.to_bytes(),
            partial_tx: Some(serialize(tx)),
            block: Some(block),
        }
    }

    pub const fn deposit_id(&self) -> &DepositId {
        &self.deposit_id
    }

    pub const fn status(&self) -> TransferStatus {
        self.status
    }

    /// Counter-chain height at which the deposit matured, if known.
    pub const fn deposit_height(&self) -> Option<u32> {
        self.deposit_height
    }

    pub fn amount(&self) -> Amount {
        Amount::from_sat(self.amount)
    }

    pub fn target_script(&self) -> ScriptBuf {
        ScriptBuf::from_bytes(self.target_script.clone())
    }

    /// Raw bytes of the current draft withdrawal transaction.
    pub fn partial_tx_raw(&self) -> Option<&[u8]> {
        self.partial_tx.as_deref()
    }

    /// Decodes the current draft withdrawal transaction.
    pub fn partial_transaction(&self) -> Result<Option<Transaction>, consensus::encode::Error> {
        self.partial_tx.as_deref().map(deserialize).transpose()
    }

    /// Location on this chain where the withdrawal was observed.
    pub const fn block(&self) -> Option<&BlockLocation> {
        self.block.as_ref()
    }

    /// Whether the record satisfies the status/block coupling rule:
    /// a block location is recorded iff the status is [`SeenInBlock`].
    ///
    /// [`SeenInBlock`]: TransferStatus::SeenInBlock
    pub fn is_consistent(&self) -> bool {
        (self.status == TransferStatus::SeenInBlock) == self.block.is_some()
    }

    /// Attach a (re)built withdrawal transaction, entering `Partial`.
    pub fn set_partial(&mut self, tx: &Transaction) {
        assert!(
            matches!(
                self.status,
                TransferStatus::Suspended | TransferStatus::Partial
            ),
            "illegal transition to Partial from {:?}",
            self.status
        );
        self.partial_tx = Some(serialize(tx));
        self.status = TransferStatus::Partial;
    }

    /// Record a fully signed and verified withdrawal transaction.
    pub fn set_fully_signed(&mut self, tx: &Transaction) {
        assert!(
            self.status == TransferStatus::Partial,
            "illegal transition to FullySigned from {:?}",
            self.status
        );
        self.partial_tx = Some(serialize(tx));
        self.status = TransferStatus::FullySigned;
    }

    /// Record the withdrawal's observation in a block on this chain.
    pub fn set_seen_in_block(&mut self, tx: &Transaction, block: BlockLocation) {
        assert!(
            self.status != TransferStatus::Rejected,
            "rejected transfer observed in block"
        );
        self.partial_tx = Some(serialize(tx));
        self.block = Some(block);
        self.status = TransferStatus::SeenInBlock;
    }

    /// Reorg: the containing block vanished, drop back to `FullySigned`.
    pub fn unsee(&mut self) {
        assert!(
            self.status == TransferStatus::SeenInBlock && self.deposit_height.is_some(),
            "cannot unsee transfer in {:?} (deposit height {:?})",
            self.status,
            self.deposit_height
        );
        self.block = None;
        self.status = TransferStatus::FullySigned;
    }

    /// The withdrawal transaction's inputs are no longer reserved for it;
    /// drop the transaction and wait for UTXOs to become available again.
    pub fn suspend(&mut self) {
        assert!(
            matches!(
                self.status,
                TransferStatus::Partial | TransferStatus::FullySigned
            ),
            "illegal transition to Suspended from {:?}",
            self.status
        );
        self.partial_tx = None;
        self.status = TransferStatus::Suspended;
    }
}

/// An atomic set of writes spanning both logical tables.
///
/// Built up by a store operation and handed to
/// [`TransferDatabase::commit`](crate::traits::TransferDatabase::commit) as
/// a unit; dropping an uncommitted batch is a rollback.
#[derive(Debug, Default)]
pub struct TransferWriteBatch {
    puts: Vec<CrossChainTransfer>,
    deletes: Vec<DepositId>,
    tip: Option<Option<ChainTip>>,
    next_mature_height: Option<u32>,
}

impl TransferWriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_transfer(&mut self, transfer: CrossChainTransfer) {
        self.puts.push(transfer);
    }

    pub fn delete_transfer(&mut self, id: DepositId) {
        self.deletes.push(id);
    }

    /// Replace the persisted local-chain tip. `None` clears it (rewind to
    /// genesis).
    pub fn set_tip(&mut self, tip: Option<ChainTip>) {
        self.tip = Some(tip);
    }

    pub fn set_next_mature_height(&mut self, height: u32) {
        self.next_mature_height = Some(height);
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
            && self.deletes.is_empty()
            && self.tip.is_none()
            && self.next_mature_height.is_none()
    }

    pub fn puts(&self) -> &[CrossChainTransfer] {
        &self.puts
    }

    pub fn deletes(&self) -> &[DepositId] {
        &self.deletes
    }

    pub fn tip_update(&self) -> Option<&Option<ChainTip>> {
        self.tip.as_ref()
    }

    pub fn next_mature_height_update(&self) -> Option<u32> {
        self.next_mature_height
    }
}

#[cfg(test)]
mod tests {
    use arbitrary::Arbitrary;
    use fedpeg_primitives::Buf32;
    use proptest::prelude::*;

    use super::*;

    fn sample_script() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0xaa, 0xbb])
    }

    #[test]
    fn test_record_layout_pinned() {
        let transfer = CrossChainTransfer {
            status: TransferStatus::Partial,
            deposit_id: DepositId::new(Buf32::from([0x11; 32])),
            deposit_height: Some(7),
            amount: 25_000,
            target_script: vec![0xaa, 0xbb],
            partial_tx: Some(vec![0xcc]),
            block: None,
        };

        let mut expected = vec![1u8]; // Partial
        expected.extend_from_slice(&[0x11; 32]); // deposit id
        expected.extend_from_slice(&[1, 7, 0, 0, 0]); // present, height 7 LE
        expected.extend_from_slice(&25_000u64.to_le_bytes()); // amount
        expected.extend_from_slice(&[2, 0, 0, 0, 0xaa, 0xbb]); // script varbytes
        expected.extend_from_slice(&[1, 1, 0, 0, 0, 0xcc]); // partial tx varbytes
        expected.push(0); // no block

        assert_eq!(borsh::to_vec(&transfer).unwrap(), expected);
    }

    #[test]
    fn test_seen_in_block_layout_tail() {
        let block = BlockLocation::new(Buf32::from([0x22; 32]), 99);
        let transfer = CrossChainTransfer {
            status: TransferStatus::SeenInBlock,
            deposit_id: DepositId::new(Buf32::zero()),
            deposit_height: None,
            amount: 0,
            target_script: vec![],
            partial_tx: None,
            block: Some(block),
        };

        let encoded = borsh::to_vec(&transfer).unwrap();
        let tail = &encoded[encoded.len() - 37..];
        assert_eq!(tail[0], 1);
        assert_eq!(&tail[1..33], &[0x22; 32]);
        assert_eq!(&tail[33..], &99u32.to_le_bytes());
    }

    #[test]
    fn test_transition_round() {
        let tx = Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };

        let mut t = CrossChainTransfer::new_suspended(
            DepositId::new(Buf32::from([1; 32])),
            10,
            Amount::from_sat(25),
            &sample_script(),
        );
        assert!(t.is_consistent());

        t.set_partial(&tx);
        assert_eq!(t.status(), TransferStatus::Partial);
        assert_eq!(t.partial_transaction().unwrap().unwrap(), tx);

        t.set_fully_signed(&tx);
        assert_eq!(t.status(), TransferStatus::FullySigned);

        let loc = BlockLocation::new(Buf32::from([2; 32]), 42);
        t.set_seen_in_block(&tx, loc);
        assert_eq!(t.block(), Some(&loc));
        assert!(t.is_consistent());

        t.unsee();
        assert_eq!(t.status(), TransferStatus::FullySigned);
        assert!(t.block().is_none());

        t.suspend();
        assert_eq!(t.status(), TransferStatus::Suspended);
        assert!(t.partial_tx_raw().is_none());
        assert!(t.is_consistent());
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    fn test_suspend_of_seen_panics() {
        let tx = Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        let mut t = CrossChainTransfer::new_seen_in_block(
            DepositId::new(Buf32::zero()),
            Amount::from_sat(1),
            &sample_script(),
            &tx,
            BlockLocation::new(Buf32::zero(), 1),
        );
        t.suspend();
    }

    proptest! {
        #[test]
        fn test_codec_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut u = arbitrary::Unstructured::new(&bytes);
            if let Ok(transfer) = CrossChainTransfer::arbitrary(&mut u) {
                let encoded = borsh::to_vec(&transfer).unwrap();
                let decoded: CrossChainTransfer = borsh::from_slice(&encoded).unwrap();
                prop_assert_eq!(decoded, transfer);
            }
        }
    }
}

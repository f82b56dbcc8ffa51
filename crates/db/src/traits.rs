//! Trait definitions for the low level transfer database interface.
//! Operations are NOT validated at this level; the transfer store is the
//! only caller and owns all invariants.

use fedpeg_primitives::{ChainTip, DepositId};

use crate::{
    errors::DbResult,
    types::{CrossChainTransfer, TransferWriteBatch},
};

/// Two logical tables: `transfers` keyed by deposit id, and `common`
/// holding the consumed local-chain tip and the next expected mature
/// counter-chain height. Reads see committed state only; `commit` applies
/// a whole [`TransferWriteBatch`] atomically across both tables.
pub trait TransferDatabase: Send + Sync + 'static {
    /// Gets a single transfer, if present.
    fn get_transfer(&self, id: &DepositId) -> DbResult<Option<CrossChainTransfer>>;

    /// Scans the whole `transfers` table. Used to rebuild the in-memory
    /// indexes at initialization.
    fn scan_transfers(&self) -> DbResult<Vec<CrossChainTransfer>>;

    /// The highest local-chain block whose withdrawals have been recorded.
    fn get_tip(&self) -> DbResult<Option<ChainTip>>;

    /// The next expected mature counter-chain height.
    fn get_next_mature_height(&self) -> DbResult<Option<u32>>;

    /// Atomically applies the batch; on error nothing is applied.
    fn commit(&self, batch: TransferWriteBatch) -> DbResult<()>;

    /// Flushes buffered writes to disk.
    fn flush(&self) -> DbResult<()>;
}

//! Sled backend for the transfer database.

pub mod config;
pub mod macros;
pub mod schema;
pub mod transfers;
mod tree;

use std::path::Path;

use fedpeg_db::DbResult;

pub use config::SledDbConfig;
pub use schema::{CodecError, KeyCodec, Schema, ValueCodec};
pub use transfers::db::TransferDBSled;
pub use tree::{SledTree, TreeError};

use crate::transfers::db::to_db_error;

/// Opens (creating if needed) the transfer database for one federation
/// multisig. Each multisig gets its own data directory under `root` so
/// several pegs can share a node.
pub fn open_transfer_database(
    root: &Path,
    multisig_address: &str,
    config: SledDbConfig,
) -> DbResult<TransferDBSled> {
    let path = root.join(format!("federatedTransfers{multisig_address}"));
    let db = sled::open(&path).map_err(to_db_error)?;
    TransferDBSled::new(db, config)
}

use std::fmt;

use fedpeg_db::{
    errors::{DbError, DbResult},
    traits::TransferDatabase,
    types::{CrossChainTransfer, TransferWriteBatch},
};
use fedpeg_primitives::{ChainTip, DepositId};
use sled::Transactional;
use tracing::error;

use super::schemas::{CommonKey, CommonSchema, TransferSchema};
use crate::{
    config::SledDbConfig,
    schema::{KeyCodec, Schema, ValueCodec},
    tree::SledTree,
};

pub(crate) fn to_db_error<E: fmt::Display>(e: E) -> DbError {
    DbError::Storage(e.to_string())
}

/// Sled-backed transfer database: the `transfers` and `common` trees plus
/// retry settings. `commit` applies a whole write batch in one sled
/// transaction spanning both trees.
#[derive(Debug)]
pub struct TransferDBSled {
    db: sled::Db,
    transfers_tree: SledTree<TransferSchema>,
    common_tree: SledTree<CommonSchema>,
    config: SledDbConfig,
}

impl TransferDBSled {
    pub fn new(db: sled::Db, config: SledDbConfig) -> DbResult<Self> {
        let transfers_tree = db
            .open_tree(TransferSchema::TREE_NAME)
            .map(SledTree::new)
            .map_err(to_db_error)?;
        let common_tree = db
            .open_tree(CommonSchema::TREE_NAME)
            .map(SledTree::new)
            .map_err(to_db_error)?;
        Ok(Self {
            db,
            transfers_tree,
            common_tree,
            config,
        })
    }
}

impl TransferDatabase for TransferDBSled {
    fn get_transfer(&self, id: &DepositId) -> DbResult<Option<CrossChainTransfer>> {
        self.transfers_tree.get(id).map_err(to_db_error)
    }

    fn scan_transfers(&self) -> DbResult<Vec<CrossChainTransfer>> {
        self.transfers_tree.values().map_err(to_db_error)
    }

    fn get_tip(&self) -> DbResult<Option<ChainTip>> {
        let Some(raw) = self
            .common_tree
            .get(&CommonKey::RepositoryTip)
            .map_err(to_db_error)?
        else {
            return Ok(None);
        };
        let tip =
            borsh::from_slice(&raw).map_err(|_| DbError::CorruptCommonEntry("repository tip"))?;
        Ok(Some(tip))
    }

    fn get_next_mature_height(&self) -> DbResult<Option<u32>> {
        let Some(raw) = self
            .common_tree
            .get(&CommonKey::NextMatureTip)
            .map_err(to_db_error)?
        else {
            return Ok(None);
        };
        let bytes: [u8; 4] = raw
            .as_slice()
            .try_into()
            .map_err(|_| DbError::CorruptCommonEntry("next mature tip"))?;
        Ok(Some(u32::from_be_bytes(bytes)))
    }

    fn commit(&self, batch: TransferWriteBatch) -> DbResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Encode everything up front so the transaction body is pure byte
        // shuffling and retries never re-run codec work.
        let mut puts = Vec::with_capacity(batch.puts().len());
        for transfer in batch.puts() {
            let key = transfer.deposit_id().encode_key().map_err(to_db_error)?;
            let value = transfer.encode_value().map_err(to_db_error)?;
            puts.push((key, value));
        }
        let mut deletes = Vec::with_capacity(batch.deletes().len());
        for id in batch.deletes() {
            deletes.push(id.encode_key().map_err(to_db_error)?);
        }

        let mut common: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
        if let Some(tip) = batch.tip_update() {
            let key = CommonKey::RepositoryTip.encode_key().map_err(to_db_error)?;
            let value = tip
                .as_ref()
                .map(|t| borsh::to_vec(t).map_err(to_db_error))
                .transpose()?;
            common.push((key, value));
        }
        if let Some(height) = batch.next_mature_height_update() {
            let key = CommonKey::NextMatureTip.encode_key().map_err(to_db_error)?;
            common.push((key, Some(height.to_be_bytes().to_vec())));
        }

        self.config
            .with_retry(|| {
                (self.transfers_tree.raw(), self.common_tree.raw()).transaction(
                    |(transfers, common_tree)| {
                        for (key, value) in &puts {
                            transfers.insert(key.as_slice(), value.as_slice())?;
                        }
                        for key in &deletes {
                            transfers.remove(key.as_slice())?;
                        }
                        for (key, value) in &common {
                            match value {
                                Some(value) => {
                                    common_tree.insert(key.as_slice(), value.as_slice())?;
                                }
                                None => {
                                    common_tree.remove(key.as_slice())?;
                                }
                            }
                        }
                        Ok::<_, sled::transaction::ConflictableTransactionError<DbError>>(())
                    },
                )
            })
            .map_err(|e| {
                error!(%e, "transfer batch commit failed");
                DbError::Transaction(e.to_string())
            })?;

        Ok(())
    }

    fn flush(&self) -> DbResult<()> {
        self.db.flush().map_err(to_db_error)?;
        Ok(())
    }
}

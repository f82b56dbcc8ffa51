use fedpeg_db::types::CrossChainTransfer;
use fedpeg_primitives::{Buf32, DepositId};

use crate::{
    define_table_without_codec, impl_borsh_value_codec,
    schema::{CodecError, CodecResult, KeyCodec, Schema, ValueCodec},
};

define_table_without_codec!(
    /// Transfer records keyed by the 32-byte counter-chain deposit id.
    (TransferSchema) DepositId => CrossChainTransfer
);

impl KeyCodec<TransferSchema> for DepositId {
    fn encode_key(&self) -> CodecResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode_key(buf: &[u8]) -> CodecResult<Self> {
        let bytes: [u8; 32] =
            buf.try_into()
                .map_err(|_| CodecError::InvalidKeyLength {
                    schema: TransferSchema::TREE_NAME,
                    expected: 32,
                    got: buf.len(),
                })?;
        Ok(DepositId::new(Buf32::from(bytes)))
    }
}

impl_borsh_value_codec!(TransferSchema, CrossChainTransfer);

/// Well-known single-byte keys of the `common` table. The repository tip
/// key is pinned to a single `0x00` byte (not the zero-length key).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommonKey {
    /// Value: borsh `BlockLocation` (32-byte hash, 4-byte LE height).
    RepositoryTip = 0x00,
    /// Value: 4-byte big-endian counter-chain height.
    NextMatureTip = 0x01,
}

define_table_without_codec!(
    /// Fixed-key singleton entries; values are raw bytes whose encoding is
    /// determined by the key.
    (CommonSchema) CommonKey => Vec<u8>
);

impl KeyCodec<CommonSchema> for CommonKey {
    fn encode_key(&self) -> CodecResult<Vec<u8>> {
        Ok(vec![*self as u8])
    }

    fn decode_key(buf: &[u8]) -> CodecResult<Self> {
        match buf {
            [0x00] => Ok(CommonKey::RepositoryTip),
            [0x01] => Ok(CommonKey::NextMatureTip),
            _ => Err(CodecError::InvalidKeyLength {
                schema: CommonSchema::TREE_NAME,
                expected: 1,
                got: buf.len(),
            }),
        }
    }
}

impl ValueCodec<CommonSchema> for Vec<u8> {
    fn encode_value(&self) -> CodecResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode_value(buf: &[u8]) -> CodecResult<Self> {
        Ok(buf.to_vec())
    }
}

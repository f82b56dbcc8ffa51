use arbitrary::Arbitrary;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::macros::internal;

/// A 32-byte buffer.
///
/// Used for block hashes, transaction ids and deposit ids. Bytes are kept
/// in their natural order; hex rendering does not apply the reversed
/// Bitcoin display convention, so a rendered value compares equal to the
/// raw bytes it wraps.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary, BorshSerialize, BorshDeserialize,
)]
pub struct Buf32(pub [u8; 32]);

internal::impl_buf_core!(Buf32, 32);
internal::impl_buf_fmt!(Buf32);
internal::impl_buf_serde!(Buf32, 32);

impl From<BlockHash> for Buf32 {
    fn from(hash: BlockHash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl From<Buf32> for BlockHash {
    fn from(buf: Buf32) -> Self {
        BlockHash::from_byte_array(buf.0)
    }
}

impl From<Txid> for Buf32 {
    fn from(txid: Txid) -> Self {
        Self(txid.to_byte_array())
    }
}

impl From<Buf32> for Txid {
    fn from(buf: Buf32) -> Self {
        Txid::from_byte_array(buf.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let buf = Buf32::from([0xab; 32]);
        let json = serde_json::to_string(&buf).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Buf32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn test_bitcoin_conversions() {
        let txid = Txid::from_byte_array([7; 32]);
        let buf: Buf32 = txid.into();
        assert_eq!(Txid::from(buf), txid);

        let hash = BlockHash::from_byte_array([9; 32]);
        let buf: Buf32 = hash.into();
        assert_eq!(BlockHash::from(buf), hash);
    }

    #[test]
    fn test_zero() {
        assert!(Buf32::zero().is_zero());
        assert!(!Buf32::from([1; 32]).is_zero());
    }
}

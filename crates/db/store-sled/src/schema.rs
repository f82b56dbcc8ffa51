use thiserror::Error;

/// Errors raised while encoding or decoding keys and values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid key length in {schema}: expected {expected}, got {got}")]
    InvalidKeyLength {
        schema: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("failed to serialize {schema}: {source}")]
    SerializationFailed {
        schema: &'static str,
        source: std::io::Error,
    },

    #[error("failed to deserialize {schema}: {source}")]
    DeserializationFailed {
        schema: &'static str,
        source: std::io::Error,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// A typed sled tree: a name plus key and value codecs.
pub trait Schema: Sized + 'static {
    /// Name of the sled tree backing this table.
    const TREE_NAME: &'static str;

    type Key: KeyCodec<Self>;
    type Value: ValueCodec<Self>;
}

pub trait KeyCodec<S: Schema>: Sized {
    fn encode_key(&self) -> CodecResult<Vec<u8>>;
    fn decode_key(buf: &[u8]) -> CodecResult<Self>;
}

pub trait ValueCodec<S: Schema>: Sized {
    fn encode_value(&self) -> CodecResult<Vec<u8>>;
    fn decode_value(buf: &[u8]) -> CodecResult<Self>;
}

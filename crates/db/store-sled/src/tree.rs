use std::marker::PhantomData;

use crate::schema::{CodecError, KeyCodec, Schema, ValueCodec};

/// Typesafe wrapper around a sled [`Tree`](sled::Tree).
#[derive(Debug, Clone)]
pub struct SledTree<S: Schema> {
    inner: sled::Tree,
    _phantom: PhantomData<S>,
}

/// Errors from typed tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
}

impl<S: Schema> SledTree<S> {
    pub(crate) fn new(inner: sled::Tree) -> Self {
        Self {
            inner,
            _phantom: PhantomData,
        }
    }

    /// The untyped tree, for multi-tree transactions. Writers going through
    /// this handle must encode with the schema codecs.
    pub(crate) fn raw(&self) -> &sled::Tree {
        &self.inner
    }

    pub fn get(&self, key: &S::Key) -> Result<Option<S::Value>, TreeError> {
        let key = key.encode_key()?;
        let val = self.inner.get(key)?;
        Ok(val
            .as_deref()
            .map(S::Value::decode_value)
            .transpose()?)
    }

    pub fn insert(&self, key: &S::Key, value: &S::Value) -> Result<(), TreeError> {
        let key = key.encode_key()?;
        let value = value.encode_value()?;
        self.inner.insert(key, value)?;
        Ok(())
    }

    pub fn remove(&self, key: &S::Key) -> Result<(), TreeError> {
        let key = key.encode_key()?;
        self.inner.remove(key)?;
        Ok(())
    }

    /// Decodes every value in the tree, in key order.
    pub fn values(&self) -> Result<Vec<S::Value>, TreeError> {
        let mut out = Vec::new();
        for entry in self.inner.iter() {
            let (_, raw) = entry?;
            out.push(S::Value::decode_value(&raw)?);
        }
        Ok(out)
    }
}

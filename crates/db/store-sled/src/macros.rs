/// Declares a table marker type and wires it to a sled tree name. Codec
/// implementations are supplied separately, either by hand or via
/// [`impl_borsh_value_codec`].
#[macro_export]
macro_rules! define_table_without_codec {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty => $value:ty) => {
        $(#[$docs])+
        #[derive(Clone, Copy, Debug, Default)]
        pub(crate) struct $table_name;

        impl $crate::schema::Schema for $table_name {
            const TREE_NAME: &'static str = ::core::stringify!($table_name);
            type Key = $key;
            type Value = $value;
        }
    };
}

/// Borsh value codec for a table whose value type derives borsh.
#[macro_export]
macro_rules! impl_borsh_value_codec {
    ($table_name:ident, $value:ty) => {
        impl $crate::schema::ValueCodec<$table_name> for $value {
            fn encode_value(
                &self,
            ) -> $crate::schema::CodecResult<::std::vec::Vec<u8>> {
                ::borsh::to_vec(self).map_err(|err| {
                    $crate::schema::CodecError::SerializationFailed {
                        schema: <$table_name as $crate::schema::Schema>::TREE_NAME,
                        source: err,
                    }
                })
            }

            fn decode_value(
                buf: &[u8],
            ) -> $crate::schema::CodecResult<Self> {
                ::borsh::BorshDeserialize::deserialize_reader(&mut &buf[..]).map_err(|err| {
                    $crate::schema::CodecError::DeserializationFailed {
                        schema: <$table_name as $crate::schema::Schema>::TREE_NAME,
                        source: err,
                    }
                })
            }
        }
    };
}

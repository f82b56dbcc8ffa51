pub(crate) mod internal {
    /// Implements constructors, conversions and slice access for a
    /// `[u8; N]` newtype buffer.
    macro_rules! impl_buf_core {
        ($name:ident, $len:expr) => {
            impl $name {
                pub const LEN: usize = $len;

                pub const fn new(data: [u8; $len]) -> Self {
                    Self(data)
                }

                pub const fn zero() -> Self {
                    Self([0; $len])
                }

                pub fn is_zero(&self) -> bool {
                    self.0.iter().all(|b| *b == 0)
                }

                pub fn as_slice(&self) -> &[u8] {
                    &self.0
                }

                pub const fn as_bytes(&self) -> &[u8; $len] {
                    &self.0
                }
            }

            impl ::std::convert::From<[u8; $len]> for $name {
                fn from(data: [u8; $len]) -> Self {
                    Self(data)
                }
            }

            impl ::std::convert::From<$name> for [u8; $len] {
                fn from(buf: $name) -> Self {
                    buf.0
                }
            }

            impl ::std::convert::AsRef<[u8; $len]> for $name {
                fn as_ref(&self) -> &[u8; $len] {
                    &self.0
                }
            }

            impl ::std::default::Default for $name {
                fn default() -> Self {
                    Self::zero()
                }
            }
        };
    }

    /// Hex-rendered `Debug`/`Display` for a buffer newtype.
    macro_rules! impl_buf_fmt {
        ($name:ident) => {
            impl ::std::fmt::Display for $name {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    f.write_str(&::const_hex::encode(self.0))
                }
            }

            impl ::std::fmt::Debug for $name {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    ::std::write!(f, "{}({})", ::std::stringify!($name), self)
                }
            }
        };
    }

    /// Hex-string serde for a buffer newtype.
    macro_rules! impl_buf_serde {
        ($name:ident, $len:expr) => {
            impl ::serde::Serialize for $name {
                fn serialize<S: ::serde::Serializer>(
                    &self,
                    serializer: S,
                ) -> ::std::result::Result<S::Ok, S::Error> {
                    serializer.serialize_str(&::const_hex::encode(self.0))
                }
            }

            impl<'de> ::serde::Deserialize<'de> for $name {
                fn deserialize<D: ::serde::Deserializer<'de>>(
                    deserializer: D,
                ) -> ::std::result::Result<Self, D::Error> {
                    let s = <::std::string::String as ::serde::Deserialize>::deserialize(
                        deserializer,
                    )?;
                    let data: [u8; $len] =
                        ::const_hex::decode_to_array(&s).map_err(::serde::de::Error::custom)?;
                    Ok(Self(data))
                }
            }
        };
    }

    pub(crate) use impl_buf_core;
    pub(crate) use impl_buf_fmt;
    pub(crate) use impl_buf_serde;
}

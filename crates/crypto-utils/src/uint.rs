//! Fixed-width unsigned integers used as hashes, secrets and chain codes.
//!
//! Values are stored as raw big-endian byte arrays exactly as produced by the
//! hash function. Hex conversion never reverses bytes; use [`UInt256::reversed`]
//! when a display order (e.g. a txid) is needed.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest;

use crate::error::CryptoError;

macro_rules! fixed_uint {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// All-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Copies `bytes`, which must be exactly the type's width.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
                let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }

            /// Finalizes a hasher and keeps its output bytes unchanged.
            ///
            /// Fails if the digest width differs from the type's width.
            pub fn from_digest<D: Digest>(hasher: D) -> Result<Self, CryptoError> {
                Self::from_slice(&hasher.finalize())
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            /// Same value with the byte order flipped.
            pub fn reversed(&self) -> Self {
                let mut bytes = self.0;
                bytes.reverse();
                Self(bytes)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CryptoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

fixed_uint!(
    /// 160-bit value, the output width of hash160.
    UInt160,
    20
);

fixed_uint!(
    /// 256-bit value: sha256 digests, transaction hashes, private scalars.
    UInt256,
    32
);

fixed_uint!(
    /// 512-bit value: BIP39 seeds and HMAC-SHA512 output.
    UInt512,
    64
);

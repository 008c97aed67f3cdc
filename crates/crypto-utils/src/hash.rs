//! Bitcoin's hash functions over the fixed-width value types, and the
//! tagged digest input that signing and verification accept.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::uint::{UInt160, UInt256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> UInt256 {
    UInt256(Sha256::digest(data).into())
}

/// Double SHA-256, the hash used for transaction ids and Base58Check checksums.
pub fn sha256d(data: &[u8]) -> UInt256 {
    UInt256(Sha256::digest(Sha256::digest(data)).into())
}

/// RIPEMD-160(SHA-256(data)), the public key hash inside P2PKH addresses.
pub fn hash160(data: &[u8]) -> UInt160 {
    UInt160(Ripemd160::digest(Sha256::digest(data)).into())
}

/// Anything that can hand over a finished 32-byte digest.
///
/// Implemented for every cloneable hasher, so an in-progress `Sha256` can be
/// passed to signing without the caller finalizing it first.
pub trait DigestLike {
    fn digest_bytes(&self) -> Vec<u8>;
}

impl<D: Digest + Clone> DigestLike for D {
    fn digest_bytes(&self) -> Vec<u8> {
        self.clone().finalize().to_vec()
    }
}

/// Message input for signing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestInput {
    /// Caller-supplied digest bytes. Must be 32 bytes long to be usable.
    RawDigest(Vec<u8>),
    /// Digest already taken from a hasher or a hash value.
    Digest(UInt256),
}

impl DigestInput {
    /// Takes the digest out of a hasher without consuming it.
    pub fn from_hasher(hasher: &impl DigestLike) -> Self {
        let bytes = hasher.digest_bytes();
        match UInt256::from_slice(&bytes) {
            Ok(value) => DigestInput::Digest(value),
            Err(_) => DigestInput::RawDigest(bytes),
        }
    }

    /// Resolves to the 32-byte prehash that ECDSA operates on.
    pub fn prehash(&self) -> Result<[u8; 32], CryptoError> {
        match self {
            DigestInput::Digest(value) => Ok(value.0),
            DigestInput::RawDigest(bytes) => bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidDigest(bytes.len())),
        }
    }
}

impl From<UInt256> for DigestInput {
    fn from(value: UInt256) -> Self {
        DigestInput::Digest(value)
    }
}

impl From<&UInt256> for DigestInput {
    fn from(value: &UInt256) -> Self {
        DigestInput::Digest(*value)
    }
}

impl From<[u8; 32]> for DigestInput {
    fn from(bytes: [u8; 32]) -> Self {
        DigestInput::Digest(UInt256(bytes))
    }
}

impl From<&[u8]> for DigestInput {
    fn from(bytes: &[u8]) -> Self {
        DigestInput::RawDigest(bytes.to_vec())
    }
}

impl From<Vec<u8>> for DigestInput {
    fn from(bytes: Vec<u8>) -> Self {
        DigestInput::RawDigest(bytes)
    }
}

impl From<Sha256> for DigestInput {
    fn from(hasher: Sha256) -> Self {
        DigestInput::Digest(UInt256(hasher.finalize().into()))
    }
}

impl From<&Sha256> for DigestInput {
    fn from(hasher: &Sha256) -> Self {
        DigestInput::from_hasher(hasher)
    }
}

use crypto_utils::{CryptoError, ErrorKind};
use thiserror::Error;

/// Bitcoin primitive errors: keys, addresses, scripts and transactions.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("secret is not in [1, n-1]")]
    OutOfRangeSecret,

    #[error("key has no secret")]
    NoSecretKey,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("child index {0} is outside the non-hardened range")]
    InvalidChildIndex(u32),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("malformed transaction: {0}")]
    Parse(String),

    #[error("no key for input {index} ({address})")]
    MissingKey { index: usize, address: String },

    #[error("transaction is already signed")]
    AlreadySigned,

    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] CryptoError),
}

impl BtcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BtcError::OutOfRangeSecret
            | BtcError::InvalidAmount(_)
            | BtcError::InvalidChildIndex(_) => ErrorKind::Range,
            BtcError::NoSecretKey
            | BtcError::AlreadySigned
            | BtcError::InsufficientFunds { .. }
            | BtcError::TransactionBuildError(_) => ErrorKind::State,
            BtcError::MissingKey { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_key_format() {
        let err = BtcError::InvalidKeyFormat("bad checksum".into());
        assert_eq!(err.to_string(), "invalid key format: bad checksum");
    }

    #[test]
    fn display_missing_key() {
        let err = BtcError::MissingKey {
            index: 2,
            address: "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".into(),
        };
        assert_eq!(
            err.to_string(),
            "no key for input 2 (1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH)"
        );
    }

    #[test]
    fn display_insufficient_funds() {
        let err = BtcError::InsufficientFunds {
            needed: 10_000,
            available: 4_000,
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: need 10000 sat, have 4000 sat"
        );
    }

    #[test]
    fn crypto_errors_convert() {
        let err: BtcError = CryptoError::InvalidChecksum.into();
        assert_eq!(err.to_string(), "encoding error: invalid checksum");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn taxonomy() {
        assert_eq!(BtcError::InvalidKeyFormat(String::new()).kind(), ErrorKind::Format);
        assert_eq!(BtcError::OutOfRangeSecret.kind(), ErrorKind::Range);
        assert_eq!(BtcError::InvalidAmount(String::new()).kind(), ErrorKind::Range);
        assert_eq!(BtcError::NoSecretKey.kind(), ErrorKind::State);
        assert_eq!(BtcError::AlreadySigned.kind(), ErrorKind::State);
        assert_eq!(
            BtcError::MissingKey {
                index: 0,
                address: String::new()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> = Box::new(BtcError::InvalidAddress("test".into()));
        assert!(err.to_string().contains("test"));
    }
}

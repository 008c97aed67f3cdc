use chain_btc::BtcError;
use crypto_utils::{CryptoError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Master public key is empty")]
    EmptyMasterKey,

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Transaction conflicts with {winner}")]
    ConflictLost { winner: String },

    #[error("A sync is already in progress")]
    SyncInProgress,

    #[error("No sync is in progress")]
    NoSyncInProgress,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config value out of range: {0}")]
    ConfigOutOfRange(String),

    #[error("Amount out of range: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Btc(#[from] BtcError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidMnemonic(_)
            | WalletError::Rejected(_)
            | WalletError::InvalidConfig(_) => ErrorKind::Format,
            WalletError::ConfigOutOfRange(_) | WalletError::InvalidAmount(_) => ErrorKind::Range,
            WalletError::DerivationFailed(_)
            | WalletError::EmptyMasterKey
            | WalletError::ConflictLost { .. }
            | WalletError::SyncInProgress
            | WalletError::NoSyncInProgress => ErrorKind::State,
            WalletError::UnknownTransaction(_) => ErrorKind::NotFound,
            WalletError::Btc(e) => e.kind(),
            WalletError::Crypto(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(WalletError::InvalidMnemonic("x".into()).kind(), ErrorKind::Format);
        assert_eq!(WalletError::EmptyMasterKey.kind(), ErrorKind::State);
        assert_eq!(WalletError::UnknownTransaction("00".into()).kind(), ErrorKind::NotFound);
        assert_eq!(WalletError::SyncInProgress.kind(), ErrorKind::State);
        assert_eq!(WalletError::ConfigOutOfRange("gap".into()).kind(), ErrorKind::Range);
    }

    #[test]
    fn lower_crate_errors_keep_their_kind() {
        let err: WalletError = BtcError::MissingKey {
            index: 0,
            address: "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "no key for input 0 (1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH)");

        let err: WalletError = CryptoError::InvalidChecksum.into();
        assert_eq!(err.kind(), ErrorKind::Format);
        let err: WalletError = BtcError::OutOfRangeSecret.into();
        assert_eq!(err.kind(), ErrorKind::Range);
    }
}

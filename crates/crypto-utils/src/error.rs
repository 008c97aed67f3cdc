use thiserror::Error;

/// Coarse classification shared by every error type in the workspace.
///
/// Signature verification mismatches are not errors; `verify` returns `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed Base58, checksum, hex or other encoded input.
    Format,
    /// A scalar or monetary value outside its valid range.
    Range,
    /// The operation is invalid for the object's current state.
    State,
    /// A required key or transaction is unknown.
    NotFound,
}

/// Encoding and hashing errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("invalid digest: expected 32 bytes, got {0}")]
    InvalidDigest(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

//! Base58 and Base58Check text encoding.
//!
//! Base58Check appends the first four bytes of sha256d(payload) before
//! encoding; decoding verifies and strips them.

use crate::error::CryptoError;
use crate::hash::sha256d;

const CHECKSUM_LEN: usize = 4;

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::InvalidBase58(e.to_string()))
}

pub fn base58check_encode(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    data.extend_from_slice(payload);
    data.extend_from_slice(&sha256d(payload).0[..CHECKSUM_LEN]);
    base58_encode(&data)
}

/// Decodes a Base58Check string and returns the payload without its checksum.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    let mut data = base58_decode(s)?;
    if data.len() < CHECKSUM_LEN {
        return Err(CryptoError::InvalidBase58(format!(
            "{} bytes is too short for a checksum",
            data.len()
        )));
    }
    let split = data.len() - CHECKSUM_LEN;
    if sha256d(&data[..split]).0[..CHECKSUM_LEN] != data[split..] {
        return Err(CryptoError::InvalidChecksum);
    }
    data.truncate(split);
    Ok(data)
}

//! # crypto-utils
//!
//! Fixed-width integers, hashing, Base58Check and secret-handling helpers
//! shared by the Bitcoin and wallet crates.

pub mod base58;
pub mod error;
pub mod hash;
pub mod random;
pub mod uint;
pub mod zeroizing;

pub use error::{CryptoError, ErrorKind};
pub use hash::{hash160, sha256, sha256d, DigestInput, DigestLike};
pub use uint::{UInt160, UInt256, UInt512};

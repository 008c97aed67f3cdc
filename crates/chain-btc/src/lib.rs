//! Bitcoin primitives for the SPV wallet.
//!
//! Legacy (base58) addresses, secp256k1 keys with the private key formats
//! wallets exchange, BIP32 derivation helpers, P2PKH/P2SH scripts, and
//! legacy transaction building, hashing and signing.

pub mod address;
pub mod bip32;
pub mod error;
pub mod key;
pub mod network;
pub mod script;
pub mod transaction;
pub mod utxo;

pub use address::{Address, AddressKind};
pub use error::BtcError;
pub use key::Key;
pub use network::{AddressParams, BtcNetwork};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use utxo::{select_utxos, Utxo, UtxoSelection};

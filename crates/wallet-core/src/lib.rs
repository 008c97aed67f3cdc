//! SPV wallet engine.
//!
//! Seed phrase to [`MasterPubKey`], receive and change addresses, and a
//! [`Wallet`] ledger fed by a network collaborator through
//! [`Wallet::add_transaction`], [`Wallet::update_transaction`],
//! [`Wallet::delete_transaction`] and the sync lifecycle calls.

pub mod config;
pub mod error;
pub mod events;
pub mod hd_derivation;
pub mod logging;
pub mod mnemonic;
pub mod types;
pub mod wallet;

pub use chain_btc::{Address, BtcNetwork, Key, Transaction};
pub use config::WalletConfig;
pub use error::WalletError;
pub use events::{SyncEvent, WalletEvent};
pub use hd_derivation::{derive_key, MasterPubKey};
pub use logging::init_logging;
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, validate_mnemonic, ZeroizingMnemonic};
pub use types::{SequenceChain, TxStatus};
pub use wallet::Wallet;

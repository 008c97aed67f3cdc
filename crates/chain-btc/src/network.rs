use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Version bytes that prefix Base58Check payloads on a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParams {
    pub pubkey_prefix: u8,
    pub script_prefix: u8,
    pub privkey_prefix: u8,
}

pub const MAINNET_PARAMS: AddressParams = AddressParams {
    pubkey_prefix: 0x00,
    script_prefix: 0x05,
    privkey_prefix: 0x80,
};

pub const TESTNET_PARAMS: AddressParams = AddressParams {
    pubkey_prefix: 0x6f,
    script_prefix: 0xc4,
    privkey_prefix: 0xef,
};

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    #[default]
    Mainnet,
    Testnet,
}

impl BtcNetwork {
    pub const ALL: [BtcNetwork; 2] = [BtcNetwork::Mainnet, BtcNetwork::Testnet];

    pub fn params(self) -> AddressParams {
        match self {
            BtcNetwork::Mainnet => MAINNET_PARAMS,
            BtcNetwork::Testnet => TESTNET_PARAMS,
        }
    }

    /// Network whose P2PKH or P2SH version byte is `prefix`.
    pub fn from_address_prefix(prefix: u8) -> Option<BtcNetwork> {
        Self::ALL.into_iter().find(|n| {
            let p = n.params();
            p.pubkey_prefix == prefix || p.script_prefix == prefix
        })
    }
}

impl fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" | "test" => Ok(BtcNetwork::Testnet),
            other => Err(BtcError::InvalidNetwork(other.to_string())),
        }
    }
}

use chain_btc::transaction::{MAX_MONEY, TX_FEE_PER_KB};
use chain_btc::BtcNetwork;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

pub const DEFAULT_GAP_LIMIT_EXTERNAL: u32 = 10;
pub const DEFAULT_GAP_LIMIT_INTERNAL: u32 = 5;

/// Wallet settings. Higher layers construct this or load it from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    pub network: BtcNetwork,
    /// Unused receive addresses kept ahead of the highest used one.
    pub gap_limit_external: u32,
    /// Unused change addresses kept ahead of the highest used one.
    pub gap_limit_internal: u32,
    /// Fee rate for transactions the wallet builds, in sat per 1000 bytes.
    pub fee_per_kb: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: BtcNetwork::Mainnet,
            gap_limit_external: DEFAULT_GAP_LIMIT_EXTERNAL,
            gap_limit_internal: DEFAULT_GAP_LIMIT_INTERNAL,
            fee_per_kb: TX_FEE_PER_KB,
        }
    }
}

impl WalletConfig {
    pub fn new(network: BtcNetwork) -> Self {
        Self { network, ..Default::default() }
    }

    pub fn with_gap_limits(mut self, external: u32, internal: u32) -> Self {
        self.gap_limit_external = external;
        self.gap_limit_internal = internal;
        self
    }

    pub fn with_fee_per_kb(mut self, fee_per_kb: u64) -> Self {
        self.fee_per_kb = fee_per_kb;
        self
    }

    /// Parses and validates. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| WalletError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, WalletError> {
        serde_json::to_string_pretty(self).map_err(|e| WalletError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.gap_limit_external == 0 || self.gap_limit_internal == 0 {
            return Err(WalletError::ConfigOutOfRange("gap limits must be at least 1".into()));
        }
        if self.fee_per_kb == 0 || self.fee_per_kb > MAX_MONEY {
            return Err(WalletError::ConfigOutOfRange(format!(
                "fee_per_kb must be in 1..={MAX_MONEY}, got {}",
                self.fee_per_kb
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::ErrorKind;

    #[test]
    fn defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.network, BtcNetwork::Mainnet);
        assert_eq!(config.gap_limit_external, 10);
        assert_eq!(config.gap_limit_internal, 5);
        assert_eq!(config.fee_per_kb, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = WalletConfig::from_json(r#"{"network":"testnet","fee_per_kb":1000}"#).unwrap();
        assert_eq!(config.network, BtcNetwork::Testnet);
        assert_eq!(config.fee_per_kb, 1_000);
        assert_eq!(config.gap_limit_external, 10);
    }

    #[test]
    fn json_round_trip() {
        let config = WalletConfig::new(BtcNetwork::Testnet).with_gap_limits(20, 7);
        let parsed = WalletConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_bad_values() {
        let err = WalletConfig::from_json(r#"{"gap_limit_internal":0}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        let err = WalletConfig::default().with_fee_per_kb(0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);

        let err = WalletConfig::from_json(r#"{"network":"regtest"}"#).unwrap_err();
        assert!(matches!(err, WalletError::InvalidConfig(_)));
        assert!(WalletConfig::from_json(r#"{"gap":3}"#).is_err());
        assert!(WalletConfig::from_json("not json").is_err());
    }
}

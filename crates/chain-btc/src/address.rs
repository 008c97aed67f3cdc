//! Base58Check P2PKH / P2SH addresses bound to one network.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crypto_utils::base58::{base58check_decode, base58check_encode};
use crypto_utils::{hash160, UInt160};

use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::script::{self, ScriptTemplate};

/// Standard script type an address pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

/// A checksum-verified address.
///
/// Equality, ordering and hashing use the encoded string only.
#[derive(Debug, Clone)]
pub struct Address {
    encoded: String,
    network: BtcNetwork,
    kind: AddressKind,
    hash: UInt160,
}

impl Address {
    pub fn p2pkh(pubkey_hash: UInt160, network: BtcNetwork) -> Self {
        Self::build(AddressKind::P2pkh, pubkey_hash, network)
    }

    pub fn p2sh(script_hash: UInt160, network: BtcNetwork) -> Self {
        Self::build(AddressKind::P2sh, script_hash, network)
    }

    /// P2PKH address of a serialized (33 or 65 byte) public key.
    pub fn from_pubkey(pubkey: &[u8], network: BtcNetwork) -> Self {
        Self::p2pkh(hash160(pubkey), network)
    }

    /// Address paid by a standard lock script, if it is one.
    pub fn from_script_pubkey(script_pubkey: &[u8], network: BtcNetwork) -> Option<Self> {
        script::classify(script_pubkey).map(|t| Self::from_template(t, network))
    }

    /// Address whose output an unlock script spends, if it can be inferred.
    pub fn from_script_sig(script_sig: &[u8], network: BtcNetwork) -> Option<Self> {
        script::classify_script_sig(script_sig).map(|t| Self::from_template(t, network))
    }

    fn from_template(template: ScriptTemplate, network: BtcNetwork) -> Self {
        match template {
            ScriptTemplate::P2pkh(hash) => Self::p2pkh(hash, network),
            ScriptTemplate::P2sh(hash) => Self::p2sh(hash, network),
        }
    }

    fn build(kind: AddressKind, hash: UInt160, network: BtcNetwork) -> Self {
        let params = network.params();
        let version = match kind {
            AddressKind::P2pkh => params.pubkey_prefix,
            AddressKind::P2sh => params.script_prefix,
        };
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(hash.as_bytes());

        Self {
            encoded: base58check_encode(&payload),
            network,
            kind,
            hash,
        }
    }

    /// Parses an address for whichever supported network its version byte names.
    pub fn parse(s: &str) -> Result<Self, BtcError> {
        let payload = base58check_decode(s)
            .map_err(|e| BtcError::InvalidAddress(format!("{s}: {e}")))?;
        if payload.len() != 21 {
            return Err(BtcError::InvalidAddress(format!(
                "expected 21 byte payload, got {}",
                payload.len()
            )));
        }

        let version = payload[0];
        let network = BtcNetwork::from_address_prefix(version)
            .ok_or_else(|| BtcError::InvalidAddress(format!("unknown version byte {version:#04x}")))?;
        let kind = if version == network.params().pubkey_prefix {
            AddressKind::P2pkh
        } else {
            AddressKind::P2sh
        };
        let hash = UInt160::from_slice(&payload[1..])?;

        Ok(Self {
            encoded: s.to_string(),
            network,
            kind,
            hash,
        })
    }

    /// Parses an address and requires it to belong to `network`.
    pub fn parse_for(s: &str, network: BtcNetwork) -> Result<Self, BtcError> {
        let address = Self::parse(s)?;
        if address.network != network {
            return Err(BtcError::InvalidAddress(format!(
                "{s} is a {} address, expected {network}",
                address.network
            )));
        }
        Ok(address)
    }

    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    pub fn is_valid_for(s: &str, network: BtcNetwork) -> bool {
        Self::parse_for(s, network).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Public key hash (P2PKH) or script hash (P2SH).
    pub fn hash160(&self) -> UInt160 {
        self.hash
    }

    /// Lock script paying to this address.
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::P2pkh => script::p2pkh_script(&self.hash),
            AddressKind::P2sh => script::p2sh_script(&self.hash),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for Address {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = BtcError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = BtcError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded.cmp(&other.encoded)
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        self.encoded == other
    }
}

impl PartialEq<&str> for Address {
    fn eq(&self, other: &&str) -> bool {
        self.encoded == *other
    }
}

impl PartialEq<String> for Address {
    fn eq(&self, other: &String) -> bool {
        &self.encoded == other
    }
}

impl PartialEq<Address> for &str {
    fn eq(&self, other: &Address) -> bool {
        *self == other.encoded
    }
}

/// An absent address never equals a present one.
impl PartialEq<Option<Address>> for Address {
    fn eq(&self, other: &Option<Address>) -> bool {
        other.as_ref().is_some_and(|o| o == self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::ErrorKind;

    const ADDR_A: &str = "1J34vj4wowwPYafbeibZGht3zy3qERoUM1";
    const ADDR_B: &str = "1F1tAaz5x1HUXrCNLbtMDqcw6o5GNn4xqX";
    const G_COMPRESSED: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn string_round_trip() {
        for s in [ADDR_A, ADDR_B, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"] {
            let address: Address = s.parse().unwrap();
            assert_eq!(address.to_string(), s);
            assert_eq!(address.network(), BtcNetwork::Mainnet);
            assert_eq!(address.kind(), AddressKind::P2pkh);
        }
    }

    #[test]
    fn equality_semantics() {
        let a = Address::parse(ADDR_A).unwrap();
        let b = Address::parse(ADDR_B).unwrap();
        assert_eq!(a, a.clone());
        assert_eq!(a, ADDR_A);
        assert_eq!(ADDR_A, a);
        assert_eq!(a, ADDR_A.to_string());
        assert_ne!(a, ADDR_B);
        assert_ne!(a, b);
        assert_ne!(a, None::<Address>);
        assert_eq!(a, Some(a.clone()));
    }

    #[test]
    fn altered_checksum_is_format_error() {
        let err = Address::parse("1J34vj4wowwPYafbeibZGht3zy3qERoUM2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn non_address_strings_fail() {
        for s in ["", "12345", "hello world", "0x000000000000000000000000000000000000dEaD"] {
            let err = Address::parse(s).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{s}");
        }
    }

    #[test]
    fn wif_payload_is_not_an_address() {
        // Valid Base58Check, but a private key version byte and 33 byte payload.
        assert!(!Address::is_valid(
            "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf"
        ));
    }

    #[test]
    fn networks_are_not_conflated() {
        let hash = hash160(&hex::decode(G_COMPRESSED).unwrap());
        let main = Address::p2pkh(hash, BtcNetwork::Mainnet);
        let test = Address::p2pkh(hash, BtcNetwork::Testnet);
        assert_eq!(main.as_str(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(test.as_str(), "mrCDrCybB6J1vRfbwM5hemdJz73FwDBC8r");
        assert_ne!(main, test);

        assert!(Address::is_valid_for(main.as_str(), BtcNetwork::Mainnet));
        assert!(!Address::is_valid_for(main.as_str(), BtcNetwork::Testnet));
        assert!(Address::is_valid_for(test.as_str(), BtcNetwork::Testnet));
        assert!(!Address::is_valid_for(test.as_str(), BtcNetwork::Mainnet));
    }

    #[test]
    fn p2sh_addresses() {
        let address = Address::parse("3P14159f73E4gFr7JterCCQh9QjiTjiZrG").unwrap();
        assert_eq!(address.kind(), AddressKind::P2sh);
        let script = address.script_pubkey();
        assert_eq!(Address::from_script_pubkey(&script, BtcNetwork::Mainnet).unwrap(), address);
    }

    #[test]
    fn from_pubkey_and_script_agree() {
        let pubkey = hex::decode(G_COMPRESSED).unwrap();
        let address = Address::from_pubkey(&pubkey, BtcNetwork::Mainnet);
        let script = address.script_pubkey();
        assert_eq!(
            Address::from_script_pubkey(&script, BtcNetwork::Mainnet).unwrap(),
            address
        );
        assert!(Address::from_script_pubkey(&[0x6a], BtcNetwork::Mainnet).is_none());

        let script_sig = script::p2pkh_script_sig(&[0x30; 71], &pubkey);
        assert_eq!(
            Address::from_script_sig(&script_sig, BtcNetwork::Mainnet).unwrap(),
            address
        );
    }

    #[test]
    fn usable_as_map_key() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Address::parse(ADDR_A).unwrap());
        set.insert(Address::parse(ADDR_A).unwrap());
        set.insert(Address::parse(ADDR_B).unwrap());
        assert_eq!(set.len(), 2);
    }
}

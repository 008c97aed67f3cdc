//! BIP32 account chain for the wallet.
//!
//! Every wallet key lives at `m/0H/<chain>/<index>`. [`MasterPubKey`] holds
//! the public half of `m/0H`, which is enough to derive every receive and
//! change address without touching the seed; signing keys are re-derived
//! from the seed on demand.

use std::fmt;

use chain_btc::bip32::{self, BIP32_HARDENED};
use chain_btc::{Address, BtcError, BtcNetwork, Key};
use crypto_utils::zeroizing::ZeroizingBytes;
use crypto_utils::UInt256;

use crate::error::WalletError;
use crate::mnemonic::mnemonic_to_seed;
use crate::types::SequenceChain;

/// Account path below the master key.
const ACCOUNT_PATH: [u32; 1] = [BIP32_HARDENED];

/// Length of [`MasterPubKey::serialize`] output.
pub const MASTER_PUBKEY_LEN: usize = 4 + 32 + 33;

/// Seed for `phrase` and `passphrase`, after checking the phrase's words and checksum.
///
/// Pure; nothing is cached between calls.
pub fn derive_key(phrase: &str, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
    mnemonic_to_seed(phrase, passphrase)
}

/// Extended public key of the wallet account (`m/0H`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MasterPubKey {
    fingerprint: [u8; 4],
    chain_code: UInt256,
    pub_key: Option<[u8; 33]>,
}

impl MasterPubKey {
    pub fn from_phrase(phrase: &str, passphrase: &str) -> Result<Self, WalletError> {
        let seed = derive_key(phrase, passphrase)?;
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self, WalletError> {
        let master = bip32::derive_xprv(seed, &[]).map_err(derivation_failed)?;
        let account = master
            .derive_child(::bip32::ChildNumber(ACCOUNT_PATH[0]))
            .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;

        Ok(Self {
            fingerprint: bip32::fingerprint(&master.public_key().to_bytes()),
            chain_code: UInt256(account.attrs().chain_code),
            pub_key: Some(account.public_key().to_bytes()),
        })
    }

    /// Parses the 69-byte `fingerprint || chain_code || pub_key` export.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != MASTER_PUBKEY_LEN {
            return Err(crypto_utils::CryptoError::InvalidLength {
                expected: MASTER_PUBKEY_LEN,
                actual: bytes.len(),
            }
            .into());
        }
        let (fingerprint, rest) = bytes.split_at(4);
        let (chain_code, pub_key) = rest.split_at(32);

        let key = Key::from_pubkey(pub_key)?;
        if !key.is_compressed() {
            return Err(BtcError::InvalidPublicKey("master public key must be compressed".into()).into());
        }

        let mut out = Self {
            chain_code: UInt256::from_slice(chain_code)?,
            ..Self::default()
        };
        out.fingerprint.copy_from_slice(fingerprint);
        let mut pk = [0u8; 33];
        pk.copy_from_slice(pub_key);
        out.pub_key = Some(pk);
        Ok(out)
    }

    /// The 69-byte export, or an empty vector for an empty key.
    pub fn serialize(&self) -> Vec<u8> {
        let Some(pub_key) = &self.pub_key else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(MASTER_PUBKEY_LEN);
        out.extend_from_slice(&self.fingerprint);
        out.extend_from_slice(self.chain_code.as_bytes());
        out.extend_from_slice(pub_key);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.pub_key.is_none()
    }

    /// Fingerprint of the master key this account hangs off.
    pub fn fingerprint(&self) -> [u8; 4] {
        self.fingerprint
    }

    pub fn chain_code(&self) -> &UInt256 {
        &self.chain_code
    }

    pub fn pub_key(&self) -> Option<&[u8; 33]> {
        self.pub_key.as_ref()
    }

    /// Compressed public key at `m/0H/<chain>/<index>`, by public derivation.
    pub fn child_pubkey(&self, chain: SequenceChain, index: u32) -> Result<[u8; 33], WalletError> {
        let pub_key = self.pub_key.as_ref().ok_or(WalletError::EmptyMasterKey)?;
        check_index(index)?;
        let (child, _) = bip32::derive_public(pub_key, &self.chain_code, &[chain.child_number(), index])?;
        Ok(child)
    }

    /// Public-only key at `m/0H/<chain>/<index>`.
    pub fn child_key(
        &self,
        chain: SequenceChain,
        index: u32,
        network: BtcNetwork,
    ) -> Result<Key, WalletError> {
        Ok(Key::from_pubkey(&self.child_pubkey(chain, index)?)?.with_network(network))
    }

    pub fn address(
        &self,
        chain: SequenceChain,
        index: u32,
        network: BtcNetwork,
    ) -> Result<Address, WalletError> {
        Ok(Address::from_pubkey(&self.child_pubkey(chain, index)?, network))
    }

    /// Signing key at `m/0H/<chain>/<index>`, re-derived from `seed`.
    ///
    /// Fails when `seed` belongs to a different wallet.
    pub fn priv_key(&self, seed: &[u8], chain: SequenceChain, index: u32) -> Result<Key, WalletError> {
        Ok(self.priv_keys(seed, &[(chain, index)])?.remove(0))
    }

    /// Signing keys for several `(chain, index)` pairs, in order.
    pub fn priv_keys(
        &self,
        seed: &[u8],
        paths: &[(SequenceChain, u32)],
    ) -> Result<Vec<Key>, WalletError> {
        if self.is_empty() {
            return Err(WalletError::EmptyMasterKey);
        }
        let account = bip32::derive_xprv(seed, &ACCOUNT_PATH).map_err(derivation_failed)?;
        if account.public_key().to_bytes() != self.pub_key.unwrap_or([0u8; 33])
            || UInt256(account.attrs().chain_code) != self.chain_code
        {
            return Err(WalletError::DerivationFailed(
                "seed does not belong to this master public key".into(),
            ));
        }

        paths
            .iter()
            .map(|&(chain, index)| {
                check_index(index)?;
                let child = account
                    .derive_child(::bip32::ChildNumber(chain.child_number()))
                    .and_then(|c| c.derive_child(::bip32::ChildNumber(index)))
                    .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
                let mut secret = UInt256(child.to_bytes());
                let key = Key::from_secret(&secret, true);
                zeroize::Zeroize::zeroize(&mut secret.0);
                Ok(key?)
            })
            .collect()
    }
}

fn check_index(index: u32) -> Result<(), WalletError> {
    if index & BIP32_HARDENED != 0 {
        return Err(BtcError::InvalidChildIndex(index).into());
    }
    Ok(())
}

fn derivation_failed(e: BtcError) -> WalletError {
    WalletError::DerivationFailed(e.to_string())
}

impl fmt::Debug for MasterPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterPubKey")
            .field("fingerprint", &hex::encode(self.fingerprint))
            .field("pub_key", &self.pub_key.map(hex::encode))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::ErrorKind;

    const AXIS: &str = "axis husband project any sea patch drip tip spirit tide bring belt";
    const INHALE: &str =
        "inhale praise target steak garlic cricket paper better evil almost sadness crawl city banner amused fringe fox insect roast aunt prefer hollow basic ladder";

    #[test]
    fn derive_key_returns_bip39_seed() {
        let seed = derive_key(AXIS, "").unwrap();
        assert_eq!(
            hex::encode(&*seed),
            "c5f428a77579a2ca6fe2c7abf3c3b91fa1800636d84aafd60dfdacca46e38248\
             96a478eeaccdcaf8d90da24bfdbce152721588a18b19c70b0c1be367df534bc8"
        );
        assert!(matches!(derive_key("axis husband", ""), Err(WalletError::InvalidMnemonic(_))));
    }

    #[test]
    fn first_receive_address() {
        let mpk = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let address = mpk.address(SequenceChain::External, 0, BtcNetwork::Mainnet).unwrap();
        assert_eq!(address, "15RBcXQMTfebbAfUFeBbcDfs1fVvPayWdU");
    }

    #[test]
    fn from_phrase_is_deterministic() {
        let a = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let b = MasterPubKey::from_phrase(AXIS, "").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, MasterPubKey::from_phrase(AXIS, "salt").unwrap());
    }

    #[test]
    fn public_and_private_derivation_agree() {
        let seed = derive_key(AXIS, "").unwrap();
        let mpk = MasterPubKey::from_seed(&seed).unwrap();
        for chain in SequenceChain::ALL {
            for index in [0, 1, 17] {
                let private = mpk.priv_key(&seed, chain, index).unwrap();
                assert!(private.has_secret());
                assert_eq!(private.pubkey(), mpk.child_pubkey(chain, index).unwrap());
            }
        }
        assert_ne!(
            mpk.child_pubkey(SequenceChain::External, 0).unwrap(),
            mpk.child_pubkey(SequenceChain::Internal, 0).unwrap()
        );
    }

    #[test]
    fn priv_keys_keep_order() {
        let seed = derive_key(AXIS, "").unwrap();
        let mpk = MasterPubKey::from_seed(&seed).unwrap();
        let paths = [(SequenceChain::Internal, 3), (SequenceChain::External, 0)];
        let keys = mpk.priv_keys(&seed, &paths).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].address().unwrap(), "15RBcXQMTfebbAfUFeBbcDfs1fVvPayWdU");
    }

    #[test]
    fn foreign_seed_is_rejected() {
        let mpk = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let other = derive_key(INHALE, "").unwrap();
        let err = mpk.priv_key(&other, SequenceChain::External, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn hardened_index_is_out_of_range() {
        let mpk = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let err = mpk.child_pubkey(SequenceChain::External, BIP32_HARDENED).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert!(mpk.child_pubkey(SequenceChain::External, BIP32_HARDENED - 1).is_ok());
    }

    #[test]
    fn empty_master_key_cannot_derive() {
        let mpk = MasterPubKey::default();
        assert!(mpk.is_empty());
        assert!(mpk.serialize().is_empty());
        let err = mpk.child_pubkey(SequenceChain::External, 0).unwrap_err();
        assert!(matches!(err, WalletError::EmptyMasterKey));
        assert_eq!(err.kind(), ErrorKind::State);
        let seed = derive_key(AXIS, "").unwrap();
        assert!(matches!(
            mpk.priv_key(&seed, SequenceChain::External, 0),
            Err(WalletError::EmptyMasterKey)
        ));
    }

    #[test]
    fn serialize_and_restore() {
        let mpk = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let bytes = mpk.serialize();
        assert_eq!(bytes.len(), MASTER_PUBKEY_LEN);

        let restored = MasterPubKey::from_bytes(&bytes).unwrap();
        assert_eq!(restored, mpk);
        assert_eq!(
            restored.address(SequenceChain::External, 0, BtcNetwork::Mainnet).unwrap(),
            "15RBcXQMTfebbAfUFeBbcDfs1fVvPayWdU"
        );

        assert!(MasterPubKey::from_bytes(&bytes[1..]).is_err());
        let mut bad = bytes.clone();
        bad[36] = 0x05;
        assert!(MasterPubKey::from_bytes(&bad).is_err());
    }

    #[test]
    fn bitid_key_from_phrase_seed() {
        let seed = derive_key(INHALE, "").unwrap();
        let key = Key::from_bitid(&seed, 0, "http://bitid.bitcoin.blue/callback").unwrap();
        assert_eq!(key.address().unwrap(), "1J34vj4wowwPYafbeibZGht3zy3qERoUM1");
    }

    #[test]
    fn debug_does_not_dump_chain_code() {
        let mpk = MasterPubKey::from_phrase(AXIS, "").unwrap();
        let debug = format!("{mpk:?}");
        assert!(!debug.contains(&mpk.chain_code().to_hex()));
    }
}

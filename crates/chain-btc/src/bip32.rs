//! BIP32 hierarchical derivation over secp256k1.
//!
//! Paths are slices of raw child numbers; set [`BIP32_HARDENED`] for
//! hardened steps.

use ::bip32::{ChildNumber, ExtendedKeyAttrs, XPrv, XPub};
use crypto_utils::{hash160, UInt256};
use k256::ecdsa::VerifyingKey;

use crate::error::BtcError;

pub const BIP32_HARDENED: u32 = ChildNumber::HARDENED_FLAG;

/// Walks `path` from the master key of `seed`.
pub fn derive_xprv(seed: &[u8], path: &[u32]) -> Result<XPrv, BtcError> {
    let mut xprv = XPrv::new(seed).map_err(|e| BtcError::Derivation(e.to_string()))?;
    for &child in path {
        xprv = xprv
            .derive_child(ChildNumber(child))
            .map_err(|e| BtcError::Derivation(e.to_string()))?;
    }
    Ok(xprv)
}

/// Private scalar at `path`.
pub fn derive_secret(seed: &[u8], path: &[u32]) -> Result<UInt256, BtcError> {
    Ok(UInt256(derive_xprv(seed, path)?.to_bytes()))
}

/// Public-only (CKDpub) derivation from a compressed key and chain code.
///
/// Returns the child's compressed public key and chain code. Hardened
/// steps cannot be taken without the private key and are rejected.
pub fn derive_public(
    pubkey: &[u8; 33],
    chain_code: &UInt256,
    path: &[u32],
) -> Result<([u8; 33], UInt256), BtcError> {
    let public_key = VerifyingKey::from_sec1_bytes(pubkey)
        .map_err(|e| BtcError::InvalidPublicKey(e.to_string()))?;
    let attrs = ExtendedKeyAttrs {
        depth: 0,
        parent_fingerprint: [0u8; 4],
        child_number: ChildNumber(0),
        chain_code: chain_code.0,
    };

    let mut xpub = XPub::new(public_key, attrs);
    for &child in path {
        if child & BIP32_HARDENED != 0 {
            return Err(BtcError::InvalidChildIndex(child));
        }
        xpub = xpub
            .derive_child(ChildNumber(child))
            .map_err(|e| BtcError::Derivation(e.to_string()))?;
    }

    Ok((xpub.to_bytes(), UInt256(xpub.attrs().chain_code)))
}

/// First four bytes of hash160 of a serialized public key.
pub fn fingerprint(pubkey: &[u8]) -> [u8; 4] {
    let hash = hash160(pubkey);
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.0[..4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP32 test vector 1
    const SEED_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    fn seed() -> Vec<u8> {
        hex::decode(SEED_HEX).unwrap()
    }

    #[test]
    fn master_key_matches_vector() {
        let xprv = derive_xprv(&seed(), &[]).unwrap();
        assert_eq!(
            hex::encode(xprv.to_bytes()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(xprv.attrs().chain_code),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(hex::encode(fingerprint(&xprv.public_key().to_bytes())), "3442193e");
    }

    #[test]
    fn hardened_child_matches_vector() {
        let secret = derive_secret(&seed(), &[BIP32_HARDENED]).unwrap();
        assert_eq!(
            secret.to_hex(),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
    }

    #[test]
    fn public_derivation_matches_private() {
        let parent = derive_xprv(&seed(), &[BIP32_HARDENED]).unwrap();
        let parent_pub = parent.public_key().to_bytes();
        let chain_code = UInt256(parent.attrs().chain_code);

        let (child_pub, child_chain) = derive_public(&parent_pub, &chain_code, &[1, 7]).unwrap();
        let private_path = derive_xprv(&seed(), &[BIP32_HARDENED, 1, 7]).unwrap();
        assert_eq!(child_pub, private_path.public_key().to_bytes());
        assert_eq!(child_chain.0, private_path.attrs().chain_code);
    }

    #[test]
    fn public_derivation_rejects_hardened_steps() {
        let xprv = derive_xprv(&seed(), &[]).unwrap();
        let err = derive_public(
            &xprv.public_key().to_bytes(),
            &UInt256(xprv.attrs().chain_code),
            &[BIP32_HARDENED | 3],
        )
        .unwrap_err();
        assert!(matches!(err, BtcError::InvalidChildIndex(_)));
    }

    #[test]
    fn bad_seed_length_is_rejected() {
        assert!(matches!(
            derive_xprv(&[0u8; 8], &[]),
            Err(BtcError::Derivation(_))
        ));
    }

    #[test]
    fn bad_public_key_is_rejected() {
        let mut bad = [0x11u8; 33];
        bad[0] = 0x05;
        let err = derive_public(&bad, &UInt256::ZERO, &[0]).unwrap_err();
        assert!(matches!(err, BtcError::InvalidPublicKey(_)));
    }
}

//! secp256k1 key pairs: private key import/export, deterministic signing,
//! compact (recoverable) signatures and BitID identity keys.

use std::fmt;
use std::sync::OnceLock;

use crypto_utils::base58::base58check_decode;
use crypto_utils::base58::base58check_encode;
use crypto_utils::{hash160, sha256, DigestInput, UInt160, UInt256};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::Zeroize;

use crate::address::Address;
use crate::bip32::{self, BIP32_HARDENED};
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// BitID keys live under m/13H.
const BITID_PURPOSE: u32 = 13;

/// Compact signature header base (27) and compressed-key offset (4).
const COMPACT_HEADER_BASE: u8 = 27;
const COMPACT_COMPRESSED_FLAG: u8 = 4;

/// An elliptic-curve key pair. Either half may be absent on an empty key;
/// a key with a secret always carries the matching public key.
#[derive(Clone, Default)]
pub struct Key {
    secret: Option<SigningKey>,
    public: Option<VerifyingKey>,
    compressed: bool,
    network: BtcNetwork,
    address: OnceLock<Address>,
}

impl Key {
    /// Empty key with no material. `is_valid()` is false.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebinds the key to `network`; the cached address is dropped.
    pub fn with_network(mut self, network: BtcNetwork) -> Self {
        self.network = network;
        self.address = OnceLock::new();
        self
    }

    pub fn from_secret(secret: &UInt256, compressed: bool) -> Result<Self, BtcError> {
        let mut key = Self::new();
        key.set_secret(secret, compressed)?;
        Ok(key)
    }

    pub fn from_privkey(privkey: &str) -> Result<Self, BtcError> {
        Self::from_privkey_for(privkey, BtcNetwork::Mainnet)
    }

    pub fn from_privkey_for(privkey: &str, network: BtcNetwork) -> Result<Self, BtcError> {
        let mut key = Self::new().with_network(network);
        key.set_privkey(privkey)?;
        Ok(key)
    }

    /// Public-only key from a 33 or 65 byte SEC1 encoding.
    pub fn from_pubkey(pubkey: &[u8]) -> Result<Self, BtcError> {
        let mut key = Self::new();
        key.set_pubkey(pubkey)?;
        Ok(key)
    }

    /// Deterministic BitID identity key for `(seed, index, uri)`.
    ///
    /// `sha256(index_le32 || uri)` is split into four little-endian words
    /// which, hardened, form the path below m/13H.
    pub fn from_bitid(seed: &[u8], index: u32, uri: &str) -> Result<Self, BtcError> {
        let mut data = Vec::with_capacity(4 + uri.len());
        data.extend_from_slice(&index.to_le_bytes());
        data.extend_from_slice(uri.as_bytes());
        let hash = sha256(&data);

        let mut path = [BIP32_HARDENED | BITID_PURPOSE; 5];
        for (slot, word) in path[1..].iter_mut().zip(hash.0.chunks_exact(4)) {
            let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            *slot = BIP32_HARDENED | word;
        }

        let mut secret = bip32::derive_secret(seed, &path)?;
        let key = Self::from_secret(&secret, true);
        secret.0.zeroize();
        key
    }

    /// Sets the private scalar, which must lie in `[1, n-1]`.
    ///
    /// On failure the key is left unchanged.
    pub fn set_secret(&mut self, secret: &UInt256, compressed: bool) -> Result<(), BtcError> {
        let signing_key =
            SigningKey::from_bytes(&secret.0.into()).map_err(|_| BtcError::OutOfRangeSecret)?;
        self.public = Some(*signing_key.verifying_key());
        self.secret = Some(signing_key);
        self.compressed = compressed;
        self.address = OnceLock::new();
        Ok(())
    }

    /// Imports a WIF, mini or 64-hex-digit private key for this key's network.
    pub fn set_privkey(&mut self, privkey: &str) -> Result<(), BtcError> {
        let (mut secret, compressed) = decode_privkey(privkey, self.network)?;
        let result = self.set_secret(&secret, compressed);
        secret.0.zeroize();
        result
    }

    /// Replaces the key with a public-only key. Any secret is discarded.
    pub fn set_pubkey(&mut self, pubkey: &[u8]) -> Result<(), BtcError> {
        let compressed = match pubkey.len() {
            33 => true,
            65 => false,
            n => {
                return Err(BtcError::InvalidPublicKey(format!(
                    "expected 33 or 65 bytes, got {n}"
                )))
            }
        };
        let public = VerifyingKey::from_sec1_bytes(pubkey)
            .map_err(|e| BtcError::InvalidPublicKey(e.to_string()))?;
        self.secret = None;
        self.public = Some(public);
        self.compressed = compressed;
        self.address = OnceLock::new();
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.public.is_some()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn secret(&self) -> Option<UInt256> {
        self.secret.as_ref().map(|k| UInt256(k.to_bytes().into()))
    }

    /// SEC1 public key, compressed or not per the key's flag. Empty if absent.
    pub fn pubkey(&self) -> Vec<u8> {
        self.public
            .as_ref()
            .map(|k| k.to_encoded_point(self.compressed).as_bytes().to_vec())
            .unwrap_or_default()
    }

    pub fn hash160(&self) -> Option<UInt160> {
        self.public.as_ref().map(|_| hash160(&self.pubkey()))
    }

    /// P2PKH address of the public key, computed once.
    pub fn address(&self) -> Option<&Address> {
        self.public.as_ref()?;
        Some(
            self.address
                .get_or_init(|| Address::from_pubkey(&self.pubkey(), self.network)),
        )
    }

    /// Exports the secret as WIF for this key's network.
    pub fn privkey(&self) -> Result<String, BtcError> {
        let mut secret = self.secret().ok_or(BtcError::NoSecretKey)?;
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.params().privkey_prefix);
        payload.extend_from_slice(secret.as_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        let encoded = base58check_encode(&payload);
        payload.zeroize();
        secret.0.zeroize();
        Ok(encoded)
    }

    /// RFC6979 deterministic, low-S, DER-encoded ECDSA signature.
    pub fn sign(&self, digest: impl Into<DigestInput>) -> Result<Vec<u8>, BtcError> {
        let signing_key = self.secret.as_ref().ok_or(BtcError::NoSecretKey)?;
        let prehash = digest.into().prehash()?;
        let sig: Signature = signing_key
            .sign_prehash(&prehash)
            .map_err(|e| BtcError::InvalidSignature(e.to_string()))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Checks a DER signature. Malformed input of any kind yields `false`.
    pub fn verify(&self, digest: impl Into<DigestInput>, signature: &[u8]) -> bool {
        let Some(public) = self.public.as_ref() else {
            return false;
        };
        let Ok(prehash) = digest.into().prehash() else {
            return false;
        };
        let Ok(sig) = Signature::from_der(signature) else {
            return false;
        };
        public.verify_prehash(&prehash, &sig).is_ok()
    }

    /// 65-byte recoverable signature: header || r || s.
    pub fn compact_sign(&self, digest: impl Into<DigestInput>) -> Result<[u8; 65], BtcError> {
        let signing_key = self.secret.as_ref().ok_or(BtcError::NoSecretKey)?;
        let prehash = digest.into().prehash()?;
        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| BtcError::InvalidSignature(e.to_string()))?;

        let mut out = [0u8; 65];
        out[0] = COMPACT_HEADER_BASE
            + recid.to_byte()
            + if self.compressed { COMPACT_COMPRESSED_FLAG } else { 0 };
        out[1..].copy_from_slice(&sig.to_bytes());
        Ok(out)
    }

    /// Recovers the signer's public key from a compact signature.
    pub fn recover_compact(
        digest: impl Into<DigestInput>,
        compact: &[u8],
    ) -> Result<Self, BtcError> {
        if compact.len() != 65 {
            return Err(BtcError::InvalidSignature(format!(
                "compact signature must be 65 bytes, got {}",
                compact.len()
            )));
        }
        let header = compact[0]
            .checked_sub(COMPACT_HEADER_BASE)
            .filter(|h| *h < 2 * COMPACT_COMPRESSED_FLAG)
            .ok_or_else(|| BtcError::InvalidSignature(format!("bad header byte {}", compact[0])))?;
        let compressed = header >= COMPACT_COMPRESSED_FLAG;
        let recid = RecoveryId::from_byte(header % COMPACT_COMPRESSED_FLAG)
            .ok_or_else(|| BtcError::InvalidSignature("bad recovery id".into()))?;

        let prehash = digest.into().prehash()?;
        let sig = Signature::from_slice(&compact[1..])
            .map_err(|e| BtcError::InvalidSignature(e.to_string()))?;
        let public = VerifyingKey::recover_from_prehash(&prehash, &sig, recid)
            .map_err(|e| BtcError::InvalidSignature(e.to_string()))?;

        Ok(Self {
            secret: None,
            public: Some(public),
            compressed,
            network: BtcNetwork::Mainnet,
            address: OnceLock::new(),
        })
    }

    /// Format and checksum check of a mainnet private key string.
    pub fn privkey_is_valid(privkey: &str) -> bool {
        Self::privkey_is_valid_for(privkey, BtcNetwork::Mainnet)
    }

    pub fn privkey_is_valid_for(privkey: &str, network: BtcNetwork) -> bool {
        decode_privkey(privkey, network)
            .map(|(mut secret, _)| secret.0.zeroize())
            .is_ok()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("pubkey", &hex::encode(self.pubkey()))
            .field("has_secret", &self.has_secret())
            .field("compressed", &self.compressed)
            .field("network", &self.network)
            .finish()
    }
}

/// Decodes a private key string into `(secret, compressed)`.
///
/// Accepted forms:
/// - WIF: Base58Check of `version || secret || 0x01?`
/// - mini key: 22 or 30 chars starting with `S`, valid when
///   `sha256(key + "?")` starts with a zero byte
/// - 64 hex digits
fn decode_privkey(privkey: &str, network: BtcNetwork) -> Result<(UInt256, bool), BtcError> {
    let len = privkey.len();

    if (len == 22 || len == 30) && privkey.starts_with('S') {
        let check = sha256(format!("{privkey}?").as_bytes());
        if check.0[0] != 0 {
            return Err(BtcError::InvalidKeyFormat("mini key check byte is not zero".into()));
        }
        return Ok((sha256(privkey.as_bytes()), false));
    }

    if len == 64 && privkey.bytes().all(|b| b.is_ascii_hexdigit()) {
        let secret = UInt256::from_hex(privkey)
            .map_err(|e| BtcError::InvalidKeyFormat(e.to_string()))?;
        return Ok((secret, false));
    }

    let mut payload =
        base58check_decode(privkey).map_err(|e| BtcError::InvalidKeyFormat(e.to_string()))?;
    let decoded = match payload.as_slice() {
        [version, ..] if *version != network.params().privkey_prefix => Err(
            BtcError::InvalidKeyFormat(format!("version byte {version:#04x} is not {network}")),
        ),
        [_, secret @ ..] if secret.len() == 32 => {
            UInt256::from_slice(secret).map(|s| (s, false)).map_err(BtcError::from)
        }
        [_, secret @ .., 0x01] if secret.len() == 32 => {
            UInt256::from_slice(secret).map(|s| (s, true)).map_err(BtcError::from)
        }
        _ => Err(BtcError::InvalidKeyFormat(format!(
            "unexpected payload length {}",
            payload.len()
        ))),
    };
    payload.zeroize();
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::ErrorKind;
    use sha2::{Digest, Sha256};

    const MINI_KEY: &str = "S6c56bnXQiBjk9mqSYE7ykVQ7NzrRy";
    const WIF_COMPRESSED_ONE: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
    const WIF_UNCOMPRESSED_ONE: &str = "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf";
    // BIP39 seed of "inhale praise target ... basic ladder", empty passphrase
    const BITID_SEED: &str = "561d6ff320ae0ac62de64a670434d3699a2efda4720d55e42d188e84aa221f6d\
                              80f167792bc8de396993129c9e53883902678ece8476c96d145abc01c94bb163";
    const BITID_URI: &str = "http://bitid.bitcoin.blue/callback";

    fn one() -> UInt256 {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        UInt256(bytes)
    }

    fn message_hash(msg: &str) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(msg.as_bytes());
        hasher
    }

    #[test]
    fn empty_key_is_invalid() {
        let key = Key::new();
        assert!(!key.is_valid());
        assert!(!key.has_secret());
        assert!(key.address().is_none());
        assert!(key.pubkey().is_empty());
        assert!(matches!(key.privkey(), Err(BtcError::NoSecretKey)));
        assert!(matches!(key.sign(sha256(b"x")), Err(BtcError::NoSecretKey)));
    }

    #[test]
    fn mini_key_address() {
        assert!(Key::privkey_is_valid(MINI_KEY));
        let mut key = Key::new();
        key.set_privkey(MINI_KEY).unwrap();
        assert!(key.is_valid());
        assert!(!key.is_compressed());
        assert_eq!(key.address().unwrap(), "1CciesT23BNionJeXrbxmjc7ywfiyM4oLW");
    }

    #[test]
    fn altered_mini_key_is_invalid() {
        let altered = format!("{}z", &MINI_KEY[..MINI_KEY.len() - 1]);
        assert!(!Key::privkey_is_valid(&altered));
        let mut key = Key::new();
        let err = key.set_privkey(&altered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(!key.is_valid());
    }

    #[test]
    fn secret_one_addresses() {
        let compressed = Key::from_secret(&one(), true).unwrap();
        assert_eq!(compressed.address().unwrap(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(compressed.pubkey().len(), 33);
        assert_eq!(compressed.privkey().unwrap(), WIF_COMPRESSED_ONE);

        let uncompressed = Key::from_secret(&one(), false).unwrap();
        assert_eq!(uncompressed.pubkey().len(), 65);
        assert_eq!(uncompressed.privkey().unwrap(), WIF_UNCOMPRESSED_ONE);
    }

    #[test]
    fn wif_import_restores_compression() {
        let key = Key::from_privkey(WIF_COMPRESSED_ONE).unwrap();
        assert!(key.is_compressed());
        assert_eq!(key.secret().unwrap(), one());

        let key = Key::from_privkey(WIF_UNCOMPRESSED_ONE).unwrap();
        assert!(!key.is_compressed());
        assert_eq!(key.secret().unwrap(), one());
    }

    #[test]
    fn wif_checksum_and_network_are_enforced() {
        let mut altered = WIF_COMPRESSED_ONE.to_string();
        altered.pop();
        altered.push('o');
        assert!(!Key::privkey_is_valid(&altered));
        assert!(Key::privkey_is_valid(WIF_COMPRESSED_ONE));
        assert!(!Key::privkey_is_valid_for(WIF_COMPRESSED_ONE, BtcNetwork::Testnet));
    }

    #[test]
    fn testnet_wif_round_trip() {
        let key = Key::from_secret(&one(), true)
            .unwrap()
            .with_network(BtcNetwork::Testnet);
        let wif = key.privkey().unwrap();
        assert!(wif.starts_with('c'));
        let back = Key::from_privkey_for(&wif, BtcNetwork::Testnet).unwrap();
        assert_eq!(back.address().unwrap(), "mrCDrCybB6J1vRfbwM5hemdJz73FwDBC8r");
    }

    #[test]
    fn hex_privkey_is_uncompressed() {
        let hex_key = "00".repeat(31) + "01";
        let key = Key::from_privkey(&hex_key).unwrap();
        assert!(!key.is_compressed());
        assert_eq!(key.secret().unwrap(), one());
    }

    #[test]
    fn out_of_range_secret_leaves_key_unchanged() {
        let mut key = Key::from_secret(&one(), true).unwrap();
        let before = key.address().unwrap().clone();

        let err = key.set_secret(&UInt256::ZERO, true).unwrap_err();
        assert!(matches!(err, BtcError::OutOfRangeSecret));
        assert_eq!(err.kind(), ErrorKind::Range);

        let order = UInt256::from_hex(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        )
        .unwrap();
        assert!(key.set_secret(&order, true).is_err());
        assert_eq!(key.address().unwrap(), &before);
        assert_eq!(key.secret().unwrap(), one());
    }

    #[test]
    fn secret_change_invalidates_cached_address() {
        let mut key = Key::from_secret(&one(), true).unwrap();
        let first = key.address().unwrap().clone();
        let mut two = [0u8; 32];
        two[31] = 2;
        key.set_secret(&UInt256(two), true).unwrap();
        assert_ne!(key.address().unwrap(), &first);
    }

    #[test]
    fn rfc6979_signature_vector() {
        let secret = UInt256::from_hex(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140",
        )
        .unwrap();
        let key = Key::from_secret(&secret, true).unwrap();
        let digest = message_hash(
            "Equations are more important to me, because politics is for the present, \
             but an equation is something for eternity.",
        );
        let sig = key.sign(&digest).unwrap();
        assert_eq!(
            hex::encode(&sig),
            "3044022054c4a33c6423d689378f160a7ff8b61330444abb58fb470f96ea16d99d4a2fed\
             022007082304410efa6b2943111b6a4e0aaa7b7db55a07e9861d1fb3cb1f421044a5"
        );
    }

    #[test]
    fn signing_is_deterministic_and_verifies() {
        let key = Key::from_privkey(MINI_KEY).unwrap();
        let digest = sha256(b"Everything should be made as simple as possible, but not simpler.");
        let a = key.sign(digest).unwrap();
        let b = key.sign(digest).unwrap();
        assert_eq!(a, b);
        assert!(key.verify(digest, &a));

        let tampered_digest = sha256(b"Everything should be made as simple as possible.");
        assert!(!key.verify(tampered_digest, &a));

        let mut tampered_sig = a.clone();
        let last = tampered_sig.len() - 1;
        tampered_sig[last] ^= 0x01;
        assert!(!key.verify(digest, &tampered_sig));
    }

    #[test]
    fn hasher_and_raw_inputs_agree() {
        let key = Key::from_secret(&one(), true).unwrap();
        let hasher = message_hash("hello");
        let raw = sha256(b"hello").0;
        assert_eq!(key.sign(&hasher).unwrap(), key.sign(&raw[..]).unwrap());
    }

    #[test]
    fn verify_never_fails_on_garbage() {
        let key = Key::from_secret(&one(), true).unwrap();
        let digest = sha256(b"data");
        assert!(!key.verify(digest, &[]));
        assert!(!key.verify(digest, &[0x30, 0x02, 0x01]));
        assert!(!key.verify(&[1u8, 2, 3][..], &key.sign(digest).unwrap()));
        assert!(!Key::new().verify(digest, &key.sign(digest).unwrap()));
    }

    #[test]
    fn short_raw_digest_cannot_be_signed() {
        let key = Key::from_secret(&one(), true).unwrap();
        let err = key.sign(&[0u8; 20][..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn public_only_key_verifies_but_cannot_sign() {
        let signer = Key::from_secret(&one(), true).unwrap();
        let digest = sha256(b"public");
        let sig = signer.sign(digest).unwrap();

        let public = Key::from_pubkey(&signer.pubkey()).unwrap();
        assert!(public.is_valid());
        assert!(!public.has_secret());
        assert!(public.verify(digest, &sig));
        assert_eq!(public.address(), signer.address());
        assert!(matches!(public.sign(digest), Err(BtcError::NoSecretKey)));
    }

    #[test]
    fn bad_public_keys_are_rejected() {
        assert!(Key::from_pubkey(&[0x02; 20]).is_err());
        let mut bad = [0x11u8; 33];
        bad[0] = 0x07;
        assert!(Key::from_pubkey(&bad).is_err());
    }

    #[test]
    fn compact_signature_recovers_signer() {
        for compressed in [true, false] {
            let key = Key::from_privkey(MINI_KEY).unwrap();
            let key = Key::from_secret(&key.secret().unwrap(), compressed).unwrap();
            let digest = sha256(b"compact");
            let sig = key.compact_sign(digest).unwrap();
            assert!((27..35).contains(&sig[0]));
            assert_eq!(sig[0] >= 31, compressed);

            let recovered = Key::recover_compact(digest, &sig).unwrap();
            assert_eq!(recovered.pubkey(), key.pubkey());
            assert_eq!(recovered.address(), key.address());
        }
    }

    #[test]
    fn compact_signature_rejects_bad_headers() {
        let digest = sha256(b"compact");
        assert!(Key::recover_compact(digest, &[0u8; 64]).is_err());
        let mut sig = Key::from_secret(&one(), true).unwrap().compact_sign(digest).unwrap();
        sig[0] = 12;
        assert!(Key::recover_compact(digest, &sig).is_err());
    }

    #[test]
    fn bitid_known_vector() {
        let seed = hex::decode(BITID_SEED).unwrap();
        let key = Key::from_bitid(&seed, 0, BITID_URI).unwrap();
        assert!(key.has_secret());
        assert_eq!(key.address().unwrap(), "1J34vj4wowwPYafbeibZGht3zy3qERoUM1");
    }

    #[test]
    fn bitid_is_deterministic_and_input_sensitive() {
        let seed = hex::decode(BITID_SEED).unwrap();
        let a = Key::from_bitid(&seed, 0, BITID_URI).unwrap();
        let b = Key::from_bitid(&seed, 0, BITID_URI).unwrap();
        assert_eq!(a.address(), b.address());

        let other_index = Key::from_bitid(&seed, 1, BITID_URI).unwrap();
        let other_uri = Key::from_bitid(&seed, 0, "http://example.com/callback").unwrap();
        assert_ne!(a.address(), other_index.address());
        assert_ne!(a.address(), other_uri.address());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let key = Key::from_secret(&one(), true).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("has_secret: true"));
        assert!(!debug.contains(&one().to_hex()));
    }
}

use bip39::{Language, Mnemonic};
use crypto_utils::random::random_bytes_fixed;
use crypto_utils::zeroizing::ZeroizingBytes;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Fresh 12-word English phrase from 128 bits of OS entropy.
pub fn generate_mnemonic() -> Result<String, WalletError> {
    let mut entropy: [u8; 16] = random_bytes_fixed();
    let result = Mnemonic::from_entropy_in(Language::English, &entropy);
    entropy.zeroize();
    result
        .map(|mnemonic| mnemonic.to_string())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Checks words against the English list and the checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    parse(phrase).is_ok()
}

/// Derive the 64-byte BIP-39 seed from mnemonic + passphrase.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
    let mnemonic = parse(phrase)?;
    Ok(ZeroizingBytes::from(mnemonic.to_seed(passphrase)))
}

fn parse(phrase: &str) -> Result<Mnemonic, WalletError> {
    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// The 2048 English words, for autocomplete.
pub fn word_list() -> &'static [&'static str] {
    Language::English.word_list()
}

pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}

/// A validated phrase, wiped on drop and redacted in `Debug`.
pub struct ZeroizingMnemonic {
    phrase: String,
}

impl ZeroizingMnemonic {
    pub fn new(phrase: String) -> Result<Self, WalletError> {
        if let Err(e) = parse(&phrase) {
            let mut phrase = phrase;
            phrase.zeroize();
            return Err(e);
        }
        Ok(Self { phrase })
    }

    pub fn generate() -> Result<Self, WalletError> {
        Self::new(generate_mnemonic()?)
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn to_seed(&self, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
        mnemonic_to_seed(&self.phrase, passphrase)
    }

    pub fn words(&self) -> Vec<&str> {
        self.phrase.split_whitespace().collect()
    }
}

impl Drop for ZeroizingMnemonic {
    fn drop(&mut self) {
        self.phrase.zeroize();
    }
}

impl std::fmt::Debug for ZeroizingMnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ZeroizingMnemonic(<{} words redacted>)", self.words().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::ErrorKind;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_mnemonic_12_words() {
        let mnemonic = generate_mnemonic().unwrap();
        let words: Vec<&str> = mnemonic.split_whitespace().collect();
        assert_eq!(words.len(), 12);
        assert!(words.iter().all(|w| is_valid_word(w)));
    }

    #[test]
    fn test_validate_valid_mnemonic() {
        let mnemonic = generate_mnemonic().unwrap();
        assert!(validate_mnemonic(&mnemonic));
        assert!(validate_mnemonic(ABANDON));
    }

    #[test]
    fn test_validate_invalid_mnemonic() {
        assert!(!validate_mnemonic("invalid mnemonic phrase here"));
        // right words, wrong checksum
        assert!(!validate_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon"
        ));
    }

    #[test]
    fn test_invalid_mnemonic_is_format_error() {
        let err = mnemonic_to_seed("zoo zoo zoo", "").unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let seed_no_pass = mnemonic_to_seed(ABANDON, "").unwrap();
        let seed_with_pass = mnemonic_to_seed(ABANDON, "mypassphrase").unwrap();
        assert_ne!(seed_no_pass, seed_with_pass);
    }

    #[test]
    fn test_bip39_test_vector() {
        let seed = mnemonic_to_seed(ABANDON, "").unwrap();
        assert_eq!(
            hex::encode(&*seed),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_is_valid_word() {
        assert_eq!(word_list().len(), 2048);
        assert!(is_valid_word("abandon"));
        assert!(is_valid_word("zoo"));
        assert!(!is_valid_word("notaword"));
        assert!(!is_valid_word(""));
    }

    #[test]
    fn test_zeroizing_mnemonic() {
        let zm = ZeroizingMnemonic::new(ABANDON.to_string()).unwrap();
        assert_eq!(zm.words().len(), 12);
        assert_eq!(zm.to_seed("").unwrap().len(), 64);
        assert_eq!(format!("{zm:?}"), "ZeroizingMnemonic(<12 words redacted>)");
        assert!(ZeroizingMnemonic::new("not a phrase".into()).is_err());
        assert_eq!(ZeroizingMnemonic::generate().unwrap().words().len(), 12);
    }
}

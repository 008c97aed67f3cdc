use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret byte buffer (BIP39 seeds, raw key material) wiped when dropped.
///
/// `Debug` never prints the contents.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingBytes(Vec<u8>);

impl ZeroizingBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ZeroizingBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ZeroizingBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ZeroizingBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for ZeroizingBytes {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for ZeroizingBytes {
    fn from(mut data: [u8; N]) -> Self {
        let out = Self::new(data.to_vec());
        data.zeroize();
        out
    }
}

impl fmt::Debug for ZeroizingBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZeroizingBytes(<{} bytes redacted>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derefs_to_contents() {
        let zb = ZeroizingBytes::new(vec![1, 2, 3]);
        assert_eq!(&*zb, &[1, 2, 3]);
        assert_eq!(zb[2], 3);
        assert_eq!(zb.len(), 3);
        assert!(!zb.is_empty());
    }

    #[test]
    fn from_fixed_array() {
        let zb: ZeroizingBytes = [0x5au8; 64].into();
        assert_eq!(zb.len(), 64);
        assert!(zb.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn debug_is_redacted() {
        let zb = ZeroizingBytes::from(&[0xde, 0xad, 0xbe, 0xef][..]);
        let debug = format!("{zb:?}");
        assert_eq!(debug, "ZeroizingBytes(<4 bytes redacted>)");
        assert!(!debug.contains("de"));
    }

    #[test]
    fn manual_zeroize_clears_buffer() {
        let mut zb = ZeroizingBytes::new(vec![0xAA; 32]);
        zb.zeroize();
        assert!(zb.is_empty());
    }
}

use rand::RngCore;
use rand_core::OsRng;

/// Fills a fixed-size array from the operating system CSPRNG.
///
/// Used for mnemonic entropy. Callers own zeroizing the result.
pub fn random_bytes_fixed<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

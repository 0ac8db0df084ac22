//! Secure random generation for session salts.
//!
//! Wraps the operating system's entropy source (/dev/urandom on Unix,
//! BCryptGenRandom on Windows).

use rand::rngs::OsRng;
use rand::RngCore;

/// Cryptographically secure random number generator.
pub struct SecureRandom;

impl SecureRandom {
    /// Fill a buffer with cryptographically secure random bytes.
    pub fn fill(dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }

    /// Generate a fresh salt of `len` bytes.
    pub fn salt(len: usize) -> Vec<u8> {
        let mut salt = vec![0u8; len];
        OsRng.fill_bytes(&mut salt);
        salt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_produces_entropy() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];
        SecureRandom::fill(&mut buf1);
        SecureRandom::fill(&mut buf2);

        assert!(!buf1.iter().all(|&b| b == 0));
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_salt_length() {
        for len in [16, 24, 32] {
            assert_eq!(SecureRandom::salt(len).len(), len);
        }
    }
}

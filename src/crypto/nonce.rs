//! The per-frame nonce counter.

use super::NONCE_LEN;

/// A 96-bit little-endian counter nonce.
///
/// Starts at zero when the direction's salt is exchanged and is incremented
/// after every AEAD call on that subkey, so no value ever repeats under one
/// key (wrap-around after 2^96 is beyond any session's lifetime and wraps
/// silently).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NonceCounter([u8; NONCE_LEN]);

impl NonceCounter {
    /// A counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current nonce value, to be consumed by exactly one AEAD call.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Advance the counter, carrying across bytes, wrapping at 2^96.
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    /// The counter as an integer, for diagnostics and tests.
    pub fn value(&self) -> u128 {
        let mut buf = [0u8; 16];
        buf[..NONCE_LEN].copy_from_slice(&self.0);
        u128::from_le_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let nonce = NonceCounter::new();
        assert_eq!(nonce.as_bytes(), &[0u8; NONCE_LEN]);
        assert_eq!(nonce.value(), 0);
    }

    #[test]
    fn test_increment_sequence() {
        let mut nonce = NonceCounter::new();
        for expected in 0..1000u128 {
            assert_eq!(nonce.value(), expected);
            nonce.increment();
        }
    }

    #[test]
    fn test_increment_carries() {
        let mut nonce = NonceCounter::new();
        for _ in 0..=255 {
            nonce.increment();
        }
        // 256 = 0x100 little-endian
        assert_eq!(nonce.as_bytes()[0], 0);
        assert_eq!(nonce.as_bytes()[1], 1);
        assert_eq!(nonce.value(), 256);
    }

    #[test]
    fn test_wraps_at_2_pow_96() {
        let mut nonce = NonceCounter([0xFF; NONCE_LEN]);
        assert_eq!(nonce.value(), (1u128 << 96) - 1);
        nonce.increment();
        assert_eq!(nonce.value(), 0);
    }
}

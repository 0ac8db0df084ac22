//! AEAD seal/open for the registered suites.
//!
//! AES-GCM for hardware-accelerated hosts, ChaCha20-Poly1305 where AES-NI
//! is unavailable. Both are constant-time and carry a 16-byte Poly1305/GHASH
//! tag appended to the ciphertext.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;

use super::{CipherKind, NonceCounter, TAG_LEN};
use crate::error::{Error, Result};

/// AES-192-GCM, absent from the `aes-gcm` aliases but part of the registry.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// A per-direction cipher instance bound to one session subkey.
///
/// One value per direction per session; the nonce counter it is used with
/// is owned by the same task, so seals and opens are strictly ordered.
pub enum SessionCipher {
    /// AES-128-GCM
    Aes128(Box<Aes128Gcm>),
    /// AES-192-GCM
    Aes192(Box<Aes192Gcm>),
    /// AES-256-GCM
    Aes256(Box<Aes256Gcm>),
    /// ChaCha20-Poly1305
    ChaCha20(Box<ChaCha20Poly1305>),
}

impl SessionCipher {
    /// Build a cipher for `kind` from a derived subkey.
    pub fn new(kind: CipherKind, subkey: &[u8]) -> Result<Self> {
        if subkey.len() != kind.key_len() {
            return Err(Error::crypto(format!(
                "subkey length {} does not match {kind}",
                subkey.len()
            )));
        }
        let cipher = match kind {
            CipherKind::Aes128Gcm => SessionCipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(subkey).map_err(|_| Error::crypto("bad key length"))?,
            )),
            CipherKind::Aes192Gcm => SessionCipher::Aes192(Box::new(
                Aes192Gcm::new_from_slice(subkey).map_err(|_| Error::crypto("bad key length"))?,
            )),
            CipherKind::Aes256Gcm => SessionCipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(subkey).map_err(|_| Error::crypto("bad key length"))?,
            )),
            CipherKind::ChaCha20Poly1305 => SessionCipher::ChaCha20(Box::new(
                ChaCha20Poly1305::new_from_slice(subkey)
                    .map_err(|_| Error::crypto("bad key length"))?,
            )),
        };
        Ok(cipher)
    }

    /// Encrypt `plaintext` under the counter's current value.
    ///
    /// Returns `ciphertext || tag`. The caller increments the counter after
    /// every seal.
    pub fn seal(&self, nonce: &NonceCounter, plaintext: &[u8]) -> Result<Vec<u8>> {
        let n = nonce.as_bytes();
        match self {
            SessionCipher::Aes128(c) => c.encrypt(n.into(), plaintext),
            SessionCipher::Aes192(c) => c.encrypt(n.into(), plaintext),
            SessionCipher::Aes256(c) => c.encrypt(n.into(), plaintext),
            SessionCipher::ChaCha20(c) => c.encrypt(n.into(), plaintext),
        }
        .map_err(|_| Error::crypto("encryption failed"))
    }

    /// Decrypt and authenticate `ciphertext || tag` under the counter's
    /// current value.
    ///
    /// A tag mismatch yields [`Error::Authentication`], which is fatal for
    /// the session.
    pub fn open(&self, nonce: &NonceCounter, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(Error::Authentication);
        }
        let n = nonce.as_bytes();
        match self {
            SessionCipher::Aes128(c) => c.decrypt(n.into(), ciphertext),
            SessionCipher::Aes192(c) => c.decrypt(n.into(), ciphertext),
            SessionCipher::Aes256(c) => c.decrypt(n.into(), ciphertext),
            SessionCipher::ChaCha20(c) => c.decrypt(n.into(), ciphertext),
        }
        .map_err(|_| Error::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_subkey, MasterKey};

    fn cipher_pair(kind: CipherKind) -> (SessionCipher, SessionCipher) {
        let master = MasterKey::derive("test", kind.key_len());
        let salt = vec![0x42u8; kind.salt_len()];
        let subkey = derive_subkey(&master, &salt).unwrap();
        (
            SessionCipher::new(kind, &subkey).unwrap(),
            SessionCipher::new(kind, &subkey).unwrap(),
        )
    }

    #[test]
    fn test_seal_open_roundtrip_all_suites() {
        for kind in CipherKind::all() {
            let (sealer, opener) = cipher_pair(kind);
            let nonce = NonceCounter::new();

            let sealed = sealer.seal(&nonce, b"hello tunnel").unwrap();
            assert_eq!(sealed.len(), 12 + TAG_LEN);

            let opened = opener.open(&nonce, &sealed).unwrap();
            assert_eq!(opened, b"hello tunnel");
        }
    }

    #[test]
    fn test_open_rejects_tampering() {
        let (sealer, opener) = cipher_pair(CipherKind::Aes256Gcm);
        let nonce = NonceCounter::new();

        let mut sealed = sealer.seal(&nonce, b"payload").unwrap();
        sealed[3] ^= 0x01;

        let err = opener.open(&nonce, &sealed).unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_open_rejects_wrong_nonce() {
        let (sealer, opener) = cipher_pair(CipherKind::ChaCha20Poly1305);
        let nonce = NonceCounter::new();
        let sealed = sealer.seal(&nonce, b"payload").unwrap();

        let mut wrong = NonceCounter::new();
        wrong.increment();
        assert!(opener.open(&wrong, &sealed).unwrap_err().is_auth_failure());
    }

    #[test]
    fn test_open_rejects_truncated_input() {
        let (_, opener) = cipher_pair(CipherKind::Aes128Gcm);
        let nonce = NonceCounter::new();
        assert!(opener.open(&nonce, &[0u8; 7]).unwrap_err().is_auth_failure());
    }

    #[test]
    fn test_new_rejects_wrong_subkey_length() {
        assert!(SessionCipher::new(CipherKind::Aes128Gcm, &[0u8; 32]).is_err());
        assert!(SessionCipher::new(CipherKind::Aes256Gcm, &[0u8; 16]).is_err());
    }
}

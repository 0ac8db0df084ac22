//! Key derivation.
//!
//! The master key is derived from the shared password with the OpenSSL
//! `EVP_BytesToKey` construction (MD5, count 1, no salt), matching every
//! other Shadowsocks implementation. Per-direction session subkeys come
//! from HKDF-SHA1 over the master key with the in-band salt and the fixed
//! info string `ss-subkey`.

use std::collections::HashMap;

use hkdf::Hkdf;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// HKDF info string fixed by the Shadowsocks AEAD spec.
const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// A password-derived master key.
///
/// Zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Derive a master key of `key_len` bytes from `password`.
    ///
    /// `m_i = MD5(m_{i-1} || password)`, concatenated and truncated.
    /// Deterministic; prefer [`MasterKeyCache::get`] so repeated sessions
    /// share one derivation.
    pub fn derive(password: &str, key_len: usize) -> Self {
        let mut key = Vec::with_capacity(key_len.div_ceil(16) * 16);
        let mut prev: Vec<u8> = Vec::new();
        while key.len() < key_len {
            let mut hasher = Md5::new();
            hasher.update(&prev);
            hasher.update(password.as_bytes());
            let digest = hasher.finalize();
            key.extend_from_slice(&digest);
            prev = digest.to_vec();
        }
        prev.zeroize();
        key.truncate(key_len);
        MasterKey(key)
    }

    /// Raw key bytes. Secret material, handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty (never true for a derived key).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        write!(f, "MasterKey({} bytes)", self.0.len())
    }
}

/// Process-wide cache of derived master keys, keyed by `(password, key_len)`.
///
/// A value with synchronized interior, shared by `Arc` between listeners;
/// writes are rare (one per distinct credential) so a plain mutex suffices.
#[derive(Default)]
pub struct MasterKeyCache {
    keys: Mutex<HashMap<(String, usize), MasterKey>>,
}

impl MasterKeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the master key for `(password, key_len)`, deriving on first use.
    pub fn get(&self, password: &str, key_len: usize) -> MasterKey {
        let mut keys = self.keys.lock();
        keys.entry((password.to_owned(), key_len))
            .or_insert_with(|| MasterKey::derive(password, key_len))
            .clone()
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// Derive a session subkey from the master key and the per-direction salt.
///
/// The subkey has the same length as the master key; the caller wraps it in
/// a cipher immediately and the buffer is zeroized on drop.
pub fn derive_subkey(master: &MasterKey, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha1>::new(Some(salt), master.as_bytes());
    let mut subkey = Zeroizing::new(vec![0u8; master.len()]);
    hk.expand(SUBKEY_INFO, &mut subkey)
        .map_err(|_| Error::crypto("HKDF expansion failed"))?;
    Ok(subkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_master_key_vectors() {
        // EVP_BytesToKey(MD5, count=1, no salt) reference values
        let k16 = MasterKey::derive("test", 16);
        assert_eq!(hex(k16.as_bytes()), "098f6bcd4621d373cade4e832627b4f6");

        let k32 = MasterKey::derive("test", 32);
        assert_eq!(
            hex(k32.as_bytes()),
            "098f6bcd4621d373cade4e832627b4f60a9172716ae6428409885b8b829ccb05"
        );

        // key_len that is not a digest multiple
        let k24 = MasterKey::derive("barfoo!", 24);
        assert_eq!(hex(k24.as_bytes()), "b3adc47839e047eb228870526dc8fc30b347287ffca3045d");
    }

    #[test]
    fn test_master_key_deterministic() {
        let a = MasterKey::derive("secret", 32);
        let b = MasterKey::derive("secret", 32);
        assert_eq!(a, b);
        assert_ne!(a, MasterKey::derive("secret", 16));
        assert_ne!(a, MasterKey::derive("Secret", 32));
    }

    #[test]
    fn test_cache_shares_derivations() {
        let cache = MasterKeyCache::new();
        let a = cache.get("test", 16);
        let b = cache.get("test", 16);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);

        cache.get("test", 32);
        cache.get("other", 16);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_subkey_vector() {
        let master = MasterKey::derive("test", 16);
        let salt: Vec<u8> = (0u8..16).collect();
        let subkey = derive_subkey(&master, &salt).unwrap();
        assert_eq!(hex(&subkey), "96b249baa3b4e00f502f84a5a90ac784");

        let master = MasterKey::derive("test", 32);
        let salt: Vec<u8> = (0u8..32).collect();
        let subkey = derive_subkey(&master, &salt).unwrap();
        assert_eq!(
            hex(&subkey),
            "0205fa486aabee35ab86fc1fa015f3a9fc5c8ce7657db427d9ba55b49e718953"
        );
    }

    #[test]
    fn test_subkey_depends_on_salt() {
        let master = MasterKey::derive("test", 32);
        let a = derive_subkey(&master, &[0u8; 32]).unwrap();
        let b = derive_subkey(&master, &[1u8; 32]).unwrap();
        assert_ne!(*a, *b);
        assert_eq!(a.len(), 32);
    }
}

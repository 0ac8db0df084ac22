//! Cryptographic primitives for the tunnel.
//!
//! This module provides:
//! - The AEAD cipher registry (AES-GCM and ChaCha20-Poly1305 suites)
//! - Password-based master key derivation with caching
//! - Per-session subkey derivation (HKDF-SHA1, salt exchanged in-band)
//! - The 96-bit little-endian frame nonce counter
//! - Secure random salt generation
//!
//! Master key material is zeroized on drop to prevent memory leakage.

mod aead;
mod kdf;
mod nonce;
mod random;

pub use aead::SessionCipher;
pub use kdf::{derive_subkey, MasterKey, MasterKeyCache};
pub use nonce::NonceCounter;
pub use random::SecureRandom;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Size of AEAD nonces in bytes (96 bits, all suites)
pub const NONCE_LEN: usize = 12;

/// Size of AEAD authentication tags in bytes (128 bits, all suites)
pub const TAG_LEN: usize = 16;

/// Maximum payload bytes carried by a single frame
pub const MAX_PAYLOAD: usize = 0x3FFF;

/// The AEAD suites a session can negotiate via configuration.
///
/// Key and salt lengths follow the Shadowsocks AEAD registry; every suite
/// uses a 12-byte nonce and a 16-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherKind {
    /// AES-128-GCM (16-byte key, 16-byte salt)
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    /// AES-192-GCM (24-byte key, 24-byte salt)
    #[serde(rename = "aes-192-gcm")]
    Aes192Gcm,
    /// AES-256-GCM (32-byte key, 32-byte salt)
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305 (32-byte key, 32-byte salt)
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes192Gcm => 24,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
        }
    }

    /// Per-direction salt length in bytes. Equal to the key length for
    /// every registered suite.
    pub fn salt_len(self) -> usize {
        self.key_len()
    }

    /// All registered suites, in registry order.
    pub fn all() -> [CipherKind; 4] {
        [
            CipherKind::Aes128Gcm,
            CipherKind::Aes192Gcm,
            CipherKind::Aes256Gcm,
            CipherKind::ChaCha20Poly1305,
        ]
    }
}

impl FromStr for CipherKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "aes-128-gcm" => Ok(CipherKind::Aes128Gcm),
            "aes-192-gcm" => Ok(CipherKind::Aes192Gcm),
            "aes-256-gcm" => Ok(CipherKind::Aes256Gcm),
            "chacha20-poly1305" | "chacha20-ietf-poly1305" => Ok(CipherKind::ChaCha20Poly1305),
            other => Err(Error::config(format!("unsupported cipher: {other}"))),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes192Gcm => "aes-192-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::ChaCha20Poly1305 => "chacha20-poly1305",
        };
        f.write_str(name)
    }
}

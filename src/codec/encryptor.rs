//! The sealing half of the codec.

use crate::crypto::{
    derive_subkey, CipherKind, MasterKey, NonceCounter, SecureRandom, SessionCipher, MAX_PAYLOAD,
    TAG_LEN,
};
use crate::error::Result;

use super::LEN_CELL;

/// Turns plaintext writes into the `salt || frame*` wire stream.
///
/// The salt is generated at construction and prefixed to the output of the
/// first write; every input slice is split into at most-`MAX_PAYLOAD` frames.
/// Frames are atomic per input slice, so there is never an in-progress frame
/// to flush at end of stream.
pub struct Encryptor {
    cipher: SessionCipher,
    nonce: NonceCounter,
    pending_salt: Option<Vec<u8>>,
}

impl Encryptor {
    /// Create an encryptor for one direction of a session.
    ///
    /// Picks a fresh random salt and derives the direction subkey from it.
    pub fn new(kind: CipherKind, master: &MasterKey) -> Result<Self> {
        let salt = SecureRandom::salt(kind.salt_len());
        let subkey = derive_subkey(master, &salt)?;
        Ok(Self {
            cipher: SessionCipher::new(kind, &subkey)?,
            nonce: NonceCounter::new(),
            pending_salt: Some(salt),
        })
    }

    /// Seal `plaintext` into zero or more frames, prefixed with the salt on
    /// the first call.
    ///
    /// An empty slice produces no frame (empty payloads are never emitted);
    /// the salt still flushes so the peer can derive its subkey.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encrypted_len(plaintext.len()));
        if let Some(salt) = self.pending_salt.take() {
            out.extend_from_slice(&salt);
        }

        for chunk in plaintext.chunks(MAX_PAYLOAD) {
            let len_bytes = (chunk.len() as u16).to_be_bytes();
            let sealed_len = self.cipher.seal(&self.nonce, &len_bytes)?;
            self.nonce.increment();

            let sealed_payload = self.cipher.seal(&self.nonce, chunk)?;
            self.nonce.increment();

            out.extend_from_slice(&sealed_len);
            out.extend_from_slice(&sealed_payload);
        }
        Ok(out)
    }

    /// Wire bytes a plaintext of `len` will occupy, salt included if still
    /// pending. Used to size output buffers.
    pub fn encrypted_len(&self, len: usize) -> usize {
        let salt = self.pending_salt.as_ref().map_or(0, Vec::len);
        let frames = len.div_ceil(MAX_PAYLOAD);
        salt + len + frames * (LEN_CELL + TAG_LEN)
    }

    /// Current nonce counter value (diagnostics and tests).
    pub fn nonce_value(&self) -> u128 {
        self.nonce.value()
    }
}

//! The opening half of the codec.

use bytes::BytesMut;

use crate::crypto::{
    derive_subkey, CipherKind, MasterKey, NonceCounter, SessionCipher, MAX_PAYLOAD, TAG_LEN,
};
use crate::error::{Error, Result};

use super::LEN_CELL;

/// Decode progress across calls.
///
/// Each state names the exact byte count it consumes before advancing; the
/// carry buffer never holds more than the current state still needs plus
/// whatever tail arrived in the same read.
enum State {
    /// Waiting for `salt_len` bytes to derive the direction subkey.
    Salt,
    /// Waiting for a sealed length cell (2 + tag bytes).
    Length,
    /// Waiting for `len` payload bytes plus the payload tag.
    Payload(usize),
    /// A fatal error was raised; all further input is refused.
    Failed,
}

/// Turns the `salt || frame*` wire stream back into plaintext.
///
/// Tolerates arbitrary chunking: partial reads accumulate in a carry buffer
/// until the current state's expected byte count is complete. Any
/// authentication or framing violation is fatal and sticky.
pub struct Decryptor {
    kind: CipherKind,
    master: MasterKey,
    cipher: Option<SessionCipher>,
    nonce: NonceCounter,
    buf: BytesMut,
    state: State,
    /// Plaintext withheld while the first payload is pending delivery.
    held: Option<Vec<u8>>,
    first_payload: Option<Vec<u8>>,
    saw_first_payload: bool,
}

impl Decryptor {
    /// Create a decryptor that emits plaintext inline (local peer).
    pub fn new(kind: CipherKind, master: MasterKey) -> Self {
        Self {
            kind,
            master,
            cipher: None,
            nonce: NonceCounter::new(),
            buf: BytesMut::new(),
            state: State::Salt,
            held: None,
            first_payload: None,
            saw_first_payload: false,
        }
    }

    /// Create a decryptor in hold mode (server peer).
    ///
    /// The first opened payload is parked for [`take_first_payload`];
    /// later plaintext accumulates until [`resume`] releases it. Hold mode
    /// ends exactly once per session.
    ///
    /// [`take_first_payload`]: Decryptor::take_first_payload
    /// [`resume`]: Decryptor::resume
    pub fn new_held(kind: CipherKind, master: MasterKey) -> Self {
        let mut dec = Self::new(kind, master);
        dec.held = Some(Vec::new());
        dec
    }

    /// Consume `input`, returning whatever plaintext completed.
    ///
    /// In hold mode the returned vector is empty; completed plaintext is
    /// parked instead. Errors are fatal: the decryptor refuses input from
    /// then on, and no plaintext from the failing frame is ever released.
    pub fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if matches!(self.state, State::Failed) {
            return Err(Error::Authentication);
        }
        self.buf.extend_from_slice(input);

        let mut out = Vec::new();
        loop {
            match self.state {
                State::Salt => {
                    let salt_len = self.kind.salt_len();
                    if self.buf.len() < salt_len {
                        break;
                    }
                    let salt = self.buf.split_to(salt_len);
                    let cipher = derive_subkey(&self.master, &salt)
                        .and_then(|subkey| SessionCipher::new(self.kind, &subkey));
                    match cipher {
                        Ok(cipher) => self.cipher = Some(cipher),
                        Err(err) => return self.fail(err),
                    }
                    self.state = State::Length;
                }
                State::Length => {
                    if self.buf.len() < LEN_CELL {
                        break;
                    }
                    let len = match self.open_length() {
                        Ok(len) => len,
                        Err(err) => return self.fail(err),
                    };
                    self.state = State::Payload(len);
                }
                State::Payload(len) => {
                    if self.buf.len() < len + TAG_LEN {
                        break;
                    }
                    let plaintext = match self.open_payload(len) {
                        Ok(p) => p,
                        Err(err) => return self.fail(err),
                    };
                    self.deliver(plaintext, &mut out);
                    self.state = State::Length;
                }
                State::Failed => unreachable!("failed state checked on entry"),
            }
        }
        Ok(out)
    }

    /// Open and validate one length cell, advancing the nonce only after
    /// the declared length proved sound.
    fn open_length(&mut self) -> Result<usize> {
        let cell = self.buf.split_to(LEN_CELL);
        let cipher = self.cipher.as_ref().expect("cipher set after salt");
        let plain = cipher.open(&self.nonce, &cell)?;
        if plain.len() != 2 {
            return Err(Error::Authentication);
        }
        let len = u16::from_be_bytes([plain[0], plain[1]]) as usize;
        // an impossible length is rejected before the counter moves, so the
        // nonce state stays consistent with the frames actually observed
        if len == 0 || len > MAX_PAYLOAD {
            return Err(Error::protocol(format!("invalid frame length {len}")));
        }
        self.nonce.increment();
        Ok(len)
    }

    fn open_payload(&mut self, len: usize) -> Result<Vec<u8>> {
        let cell = self.buf.split_to(len + TAG_LEN);
        let cipher = self.cipher.as_ref().expect("cipher set after salt");
        let plain = cipher.open(&self.nonce, &cell)?;
        self.nonce.increment();
        Ok(plain)
    }

    /// Route one verified payload: first to the one-shot slot, the rest to
    /// the hold buffer or straight out.
    fn deliver(&mut self, plaintext: Vec<u8>, out: &mut Vec<u8>) {
        if self.held.is_some() && !self.saw_first_payload {
            self.saw_first_payload = true;
            self.first_payload = Some(plaintext);
            return;
        }
        match self.held.as_mut() {
            Some(held) => held.extend_from_slice(&plaintext),
            None => out.extend_from_slice(&plaintext),
        }
    }

    fn fail(&mut self, err: Error) -> Result<Vec<u8>> {
        self.state = State::Failed;
        self.buf.clear();
        Err(err)
    }

    /// Take the parked first payload, if a whole first frame has verified.
    /// One-shot: subsequent calls return `None`.
    pub fn take_first_payload(&mut self) -> Option<Vec<u8>> {
        self.first_payload.take()
    }

    /// Leave hold mode, releasing plaintext buffered since the first
    /// payload, in order. No-op (empty) when not holding.
    pub fn resume(&mut self) -> Vec<u8> {
        self.held.take().unwrap_or_default()
    }

    /// Bytes currently carried while waiting for the next state boundary.
    pub fn carried(&self) -> usize {
        self.buf.len()
    }
}

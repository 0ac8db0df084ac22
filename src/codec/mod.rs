//! The AEAD stream codec.
//!
//! Each direction of a session is a single byte stream:
//!
//! ```text
//! salt (salt_len) || frame*
//! frame := seal(len as u16_be) || tag(16) || seal(payload) || tag(16)
//!          where 1 <= len <= 0x3FFF
//! ```
//!
//! The length cell is sealed under the current nonce, the payload cell under
//! the next one; the counter advances after every AEAD call. Both halves of
//! the codec are plain byte transforms: they tolerate arbitrary input chunk
//! boundaries and never assume inputs align with frames, so they compose
//! with any transport that delivers the stream in order.

mod decryptor;
mod encryptor;

pub use decryptor::Decryptor;
pub use encryptor::Encryptor;

use crate::crypto::TAG_LEN;

/// Bytes occupied by a sealed length cell: 2-byte big-endian length plus tag.
pub(crate) const LEN_CELL: usize = 2 + TAG_LEN;

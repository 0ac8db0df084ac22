//! # shadowpipe
//!
//! A Shadowsocks-compatible encrypted TCP proxy: a local SOCKS5 (and HTTP
//! CONNECT) gateway that tunnels traffic, under chunked authenticated
//! encryption, to a remote peer that relays plaintext to the destination.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────┐  SOCKS5 / CONNECT  ┌────────────┐            ┌─────────────┐
//! │  client  ├───────────────────►│ local peer │            │ server peer │
//! └──────────┘                    │  ┌───────┐ │  tcp / ws  │  ┌───────┐  │
//!                                 │  │ codec ├─┼────────────┼─►│ codec │  │
//!                                 │  └───────┘ │ salt‖frame*│  └───┬───┘  │
//!                                 └────────────┘            └──────┼──────┘
//!                                                                  │ plaintext
//!                                                           ┌──────▼──────┐
//!                                                           │ destination │
//!                                                           └─────────────┘
//! ```
//!
//! Each direction of a session carries `salt || frame*`, where every frame
//! is a sealed 2-byte length cell followed by a sealed payload of at most
//! [`crypto::MAX_PAYLOAD`] bytes. Subkeys are derived per direction from
//! the shared password and the in-band salt; nonces count up from zero and
//! never repeat under one subkey.
//!
//! ## Design Goals
//!
//! 1. **Wire compatibility**: interoperates with Shadowsocks AEAD peers
//! 2. **Strict authentication**: no plaintext moves before its tag verifies
//! 3. **Deterministic teardown**: both sockets of a session live and die
//!    together, on error, EOF, or the inactivity deadline
//! 4. **Transport agnosticism**: the codec sees bytes, whether they ride
//!    raw TCP or WebSocket messages

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod addr;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod dns;
pub mod error;
pub mod http;
pub mod local;
pub mod relay;
pub mod server;
pub mod socks5;
pub mod transport;

pub use config::{Config, TunnelMode};
pub use error::{Error, Result};
pub use local::LocalNode;
pub use server::ServerNode;

//! The Shadowsocks address header.
//!
//! ```text
//! ATYP (1) | address | port (2, big-endian)
//!   0x01     4-byte IPv4
//!   0x03     1-byte length + ASCII domain
//!   0x04     16-byte IPv6
//! ```
//!
//! The same layout appears in the SOCKS5 request, so the local peer can
//! forward the client's bytes to the server verbatim as first payload.
//! Parsing is pure: domains are carried as names and resolved elsewhere.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

/// ATYP byte for IPv4 addresses.
pub const ATYP_IPV4: u8 = 0x01;
/// ATYP byte for domain names.
pub const ATYP_DOMAIN: u8 = 0x03;
/// ATYP byte for IPv6 addresses.
pub const ATYP_IPV6: u8 = 0x04;

/// A parsed destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Literal IPv4 destination
    Ipv4(Ipv4Addr, u16),
    /// Domain destination, resolved by the server peer
    Domain(String, u16),
    /// Literal IPv6 destination
    Ipv6(Ipv6Addr, u16),
}

impl Address {
    /// Parse one address header from the start of `buf`.
    ///
    /// Returns the address and the number of bytes consumed; anything after
    /// that offset belongs to the tunneled payload. Errors if the buffer is
    /// shorter than the declared ATYP requires or the ATYP is unknown.
    pub fn parse(buf: &[u8]) -> Result<(Address, usize)> {
        let atyp = *buf.first().ok_or_else(|| Error::address("empty header"))?;
        match atyp {
            ATYP_IPV4 => {
                if buf.len() < 7 {
                    return Err(Error::address("truncated IPv4 header"));
                }
                let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
                let port = u16::from_be_bytes([buf[5], buf[6]]);
                Ok((Address::Ipv4(ip, port), 7))
            }
            ATYP_DOMAIN => {
                if buf.len() < 2 {
                    return Err(Error::address("missing domain length"));
                }
                let len = buf[1] as usize;
                let end = 2 + len + 2;
                if buf.len() < end {
                    return Err(Error::address("truncated domain header"));
                }
                let name = std::str::from_utf8(&buf[2..2 + len])
                    .map_err(|_| Error::address("domain is not valid UTF-8"))?;
                let port = u16::from_be_bytes([buf[2 + len], buf[3 + len]]);
                Ok((Address::Domain(name.to_owned(), port), end))
            }
            ATYP_IPV6 => {
                if buf.len() < 19 {
                    return Err(Error::address("truncated IPv6 header"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                let port = u16::from_be_bytes([buf[17], buf[18]]);
                Ok((Address::Ipv6(Ipv6Addr::from(octets), port), 19))
            }
            other => Err(Error::address(format!("unknown address type {other:#04x}"))),
        }
    }

    /// Append the header bytes for this address to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Address::Ipv4(ip, port) => {
                out.push(ATYP_IPV4);
                out.extend_from_slice(&ip.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
            Address::Domain(name, port) => {
                out.push(ATYP_DOMAIN);
                debug_assert!(name.len() <= u8::MAX as usize);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            }
            Address::Ipv6(ip, port) => {
                out.push(ATYP_IPV6);
                out.extend_from_slice(&ip.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
    }

    /// The header as a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19);
        self.write_to(&mut out);
        out
    }

    /// Destination host as a string (IP literal or domain name).
    pub fn host(&self) -> String {
        match self {
            Address::Ipv4(ip, _) => ip.to_string(),
            Address::Domain(name, _) => name.clone(),
            Address::Ipv6(ip, _) => ip.to_string(),
        }
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(_, port) | Address::Domain(_, port) | Address::Ipv6(_, port) => *port,
        }
    }

    /// Build an address from a `host:port` pair, classifying IP literals.
    pub fn from_host_port(host: &str, port: u16) -> Result<Address> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(Address::Ipv4(ip, port));
        }
        if let Ok(ip) = host.parse::<Ipv6Addr>() {
            return Ok(Address::Ipv6(ip, port));
        }
        if host.is_empty() || host.len() > u8::MAX as usize {
            return Err(Error::address("domain length out of range"));
        }
        Ok(Address::Domain(host.to_owned(), port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip, port) => write!(f, "{ip}:{port}"),
            Address::Domain(name, port) => write!(f, "{name}:{port}"),
            Address::Ipv6(ip, port) => write!(f, "[{ip}]:{port}"),
        }
    }
}

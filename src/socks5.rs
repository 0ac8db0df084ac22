//! The client-facing SOCKS5 handshake (RFC 1928 subset).
//!
//! Method `00` (no authentication) and command `CONNECT` only. The request's
//! address bytes are kept verbatim: they are exactly the Shadowsocks header
//! the local peer forwards to the server as first payload.
//!
//! The positive reply is NOT sent here — the caller writes it only once the
//! upstream tunnel transport is connected, so the client never observes
//! success before bytes can actually flow.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::addr::{Address, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};
use crate::error::{Error, Result};

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;

/// Reply code: succeeded.
pub const REPLY_SUCCEEDED: u8 = 0x00;
/// Reply code: connection refused (tunnel could not be established).
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// Reply code: command not supported.
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
/// Reply code: address type not supported.
pub const REPLY_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

/// The outcome of a completed SOCKS5 exchange.
#[derive(Debug)]
pub struct SocksRequest {
    /// Parsed destination.
    pub address: Address,
    /// Raw `ATYP | address | port` bytes, forwarded as first payload.
    pub header: Vec<u8>,
}

/// Drive the greeting and request phases on a client socket.
///
/// On protocol violations the appropriate failure reply is written before
/// the error is returned; the caller closes the socket either way. Short
/// reads are fatal with no reply (the client is gone).
pub async fn handshake<S>(stream: &mut S) -> Result<SocksRequest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    greeting(stream).await?;
    request(stream).await
}

async fn greeting<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(Error::protocol(format!("bad SOCKS version {:#04x}", head[0])));
    }

    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&METHOD_NO_AUTH) {
        stream
            .write_all(&[SOCKS_VERSION, METHOD_NO_ACCEPTABLE])
            .await?;
        return Err(Error::protocol("no acceptable authentication method"));
    }
    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
    Ok(())
}

async fn request<S>(stream: &mut S) -> Result<SocksRequest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;

    if head[0] != SOCKS_VERSION {
        return Err(Error::protocol(format!("bad request version {:#04x}", head[0])));
    }
    if head[1] != CMD_CONNECT {
        write_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(Error::protocol(format!("unsupported command {:#04x}", head[1])));
    }
    if head[2] != 0x00 {
        tracing::warn!("non-zero RSV byte {:#04x} in SOCKS5 request", head[2]);
    }

    let atyp = head[3];
    let mut header = vec![atyp];
    match atyp {
        ATYP_IPV4 => {
            let mut rest = [0u8; 6];
            stream.read_exact(&mut rest).await?;
            header.extend_from_slice(&rest);
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut rest = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut rest).await?;
            header.push(len[0]);
            header.extend_from_slice(&rest);
        }
        ATYP_IPV6 => {
            let mut rest = [0u8; 18];
            stream.read_exact(&mut rest).await?;
            header.extend_from_slice(&rest);
        }
        other => {
            write_reply(stream, REPLY_ADDRESS_NOT_SUPPORTED).await?;
            return Err(Error::protocol(format!("unsupported address type {other:#04x}")));
        }
    }

    let (address, consumed) = Address::parse(&header)?;
    debug_assert_eq!(consumed, header.len());
    Ok(SocksRequest { address, header })
}

/// Write a reply with the given code and a zeroed IPv4 bind address.
pub async fn write_reply<S>(stream: &mut S, code: u8) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS_VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::duplex;

    async fn drive(client_bytes: &[u8]) -> (Result<SocksRequest>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);
        client.write_all(client_bytes).await.unwrap();
        let result = handshake(&mut server).await;
        drop(server);
        let mut replies = Vec::new();
        client.read_to_end(&mut replies).await.unwrap();
        (result, replies)
    }

    #[tokio::test]
    async fn test_connect_ipv4() {
        let (result, replies) =
            drive(&[5, 1, 0, /* request */ 5, 1, 0, 1, 127, 0, 0, 1, 0, 9]).await;
        let req = result.unwrap();
        assert_eq!(req.address, Address::Ipv4(Ipv4Addr::LOCALHOST, 9));
        assert_eq!(req.header, [1, 127, 0, 0, 1, 0, 9]);
        // only the method selection was written; success reply is the caller's
        assert_eq!(replies, [5, 0]);
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let mut bytes = vec![5, 1, 0, 5, 1, 0, 3, 11];
        bytes.extend_from_slice(b"example.com");
        bytes.extend_from_slice(&80u16.to_be_bytes());
        let (result, _) = drive(&bytes).await;
        let req = result.unwrap();
        assert_eq!(req.address, Address::Domain("example.com".into(), 80));
        assert_eq!(req.header[0], ATYP_DOMAIN);
        assert_eq!(req.header.len(), 2 + 11 + 2);
    }

    #[tokio::test]
    async fn test_unsupported_method_gets_ff() {
        // greeting offering only GSSAPI (0x01) and USERNAME/PASSWORD (0x02)
        let (result, replies) = drive(&[5, 2, 1, 2]).await;
        assert!(result.is_err());
        assert_eq!(replies, [5, 0xFF]);
    }

    #[tokio::test]
    async fn test_bad_version_is_fatal_without_reply() {
        let (result, replies) = drive(&[4, 1, 0]).await;
        assert!(result.is_err());
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_bind_command_gets_07() {
        let (result, replies) = drive(&[5, 1, 0, 5, 2, 0, 1, 1, 2, 3, 4, 0, 80]).await;
        assert!(result.is_err());
        assert_eq!(&replies[2..], &[5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_unknown_atyp_gets_08() {
        let (result, replies) = drive(&[5, 1, 0, 5, 1, 0, 2, 9, 9]).await;
        assert!(result.is_err());
        assert_eq!(&replies[2..], &[5, 8, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_short_read_is_fatal() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 3, 0]).await.unwrap();
        drop(client); // greeting truncated mid-methods
        assert!(handshake(&mut server).await.is_err());
    }
}

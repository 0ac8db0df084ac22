//! HTTP CONNECT front-end.
//!
//! A convenience adapter over the same tunnel path as the SOCKS5 entry:
//! browsers configured with an HTTP proxy issue `CONNECT host:port`, we
//! answer `200 Connection Established` once the tunnel transport is up, and
//! from then on the socket is an opaque byte pipe. Plain-method requests
//! are refused; this front-end tunnels, it does not speak HTTP upstream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::addr::Address;
use crate::error::{Error, Result};

/// Longest request head we are willing to buffer.
const MAX_HEAD: usize = 8 * 1024;

/// A parsed CONNECT request.
#[derive(Debug)]
pub struct ConnectRequest {
    /// Tunnel destination.
    pub address: Address,
    /// Bytes the client sent past the request head (rare, but some clients
    /// pipeline the TLS ClientHello).
    pub excess: Vec<u8>,
}

/// Read and parse one CONNECT request head.
///
/// Replies `405` to other methods before failing; malformed heads fail
/// without a reply.
pub async fn handshake<S>(stream: &mut S) -> Result<ConnectRequest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (head, excess) = read_head(stream).await?;

    let request_line = head
        .split("\r\n")
        .next()
        .ok_or_else(|| Error::protocol("empty HTTP request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::protocol("missing HTTP method"))?;
    let target = parts
        .next()
        .ok_or_else(|| Error::protocol("missing CONNECT target"))?;

    if !method.eq_ignore_ascii_case("CONNECT") {
        stream
            .write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n")
            .await?;
        return Err(Error::protocol(format!("unsupported HTTP method {method}")));
    }

    let (host, port) = split_authority(target)?;
    let address = Address::from_host_port(host, port)?;
    Ok(ConnectRequest { address, excess })
}

/// Confirm the tunnel to the client.
pub async fn write_established<S: AsyncWrite + Unpin>(stream: &mut S) -> Result<()> {
    stream
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    Ok(())
}

/// Report a failed tunnel to the client.
pub async fn write_bad_gateway<S: AsyncWrite + Unpin>(stream: &mut S) -> Result<()> {
    stream
        .write_all(b"HTTP/1.1 502 Bad Gateway\r\nConnection: close\r\n\r\n")
        .await?;
    Ok(())
}

/// Accumulate bytes until the blank line, splitting head from excess.
async fn read_head<S>(stream: &mut S) -> Result<(String, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::protocol("connection closed mid-request"));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buf) {
            let excess = buf.split_off(end);
            let head = String::from_utf8(buf)
                .map_err(|_| Error::protocol("request head is not valid UTF-8"))?;
            return Ok((head, excess));
        }
        if buf.len() > MAX_HEAD {
            return Err(Error::protocol("request head too large"));
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Split `host:port` (or `[v6]:port`) into its parts.
fn split_authority(target: &str) -> Result<(&str, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| Error::protocol("CONNECT target missing port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::protocol("CONNECT target port is not a number"))?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio::io::duplex;

    async fn drive(request: &[u8]) -> (Result<ConnectRequest>, Vec<u8>) {
        let (mut client, mut server) = duplex(4096);
        client.write_all(request).await.unwrap();
        let result = handshake(&mut server).await;
        drop(server);
        let mut replies = Vec::new();
        client.read_to_end(&mut replies).await.unwrap();
        (result, replies)
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let (result, _) =
            drive(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n").await;
        let req = result.unwrap();
        assert_eq!(req.address, Address::Domain("example.com".into(), 443));
        assert!(req.excess.is_empty());
    }

    #[tokio::test]
    async fn test_connect_ipv4_and_excess() {
        let (result, _) = drive(b"CONNECT 10.1.2.3:80 HTTP/1.1\r\n\r\n\x16\x03\x01").await;
        let req = result.unwrap();
        assert_eq!(req.address, Address::Ipv4(Ipv4Addr::new(10, 1, 2, 3), 80));
        assert_eq!(req.excess, b"\x16\x03\x01");
    }

    #[tokio::test]
    async fn test_connect_ipv6_brackets() {
        let (result, _) = drive(b"CONNECT [::1]:8080 HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            result.unwrap().address,
            Address::Ipv6(Ipv6Addr::LOCALHOST, 8080)
        );
    }

    #[tokio::test]
    async fn test_get_gets_405() {
        let (result, replies) = drive(b"GET http://example.com/ HTTP/1.1\r\n\r\n").await;
        assert!(result.is_err());
        assert!(replies.starts_with(b"HTTP/1.1 405"));
    }

    #[tokio::test]
    async fn test_missing_port_is_fatal() {
        let (result, replies) = drive(b"CONNECT example.com HTTP/1.1\r\n\r\n").await;
        assert!(result.is_err());
        assert!(replies.is_empty());
    }
}

//! The tunnel byte duplex.
//!
//! The codec and relay engine depend only on `AsyncRead + AsyncWrite`; this
//! module provides the two concrete realizations — a plain TCP socket and a
//! WebSocket bridged to a byte stream — behind one enum so sessions handle
//! either uniformly.

mod ws;

pub use ws::WsStream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;

use crate::config::{Config, TunnelMode};
use crate::error::{Error, Result};

/// One leg of the encrypted tunnel between the peers.
pub enum Tunnel {
    /// Raw TCP
    Tcp(TcpStream),
    /// WebSocket (`ws://` or `wss://`) bridged to a byte stream
    Ws(Box<WsStream<MaybeTlsStream<TcpStream>>>),
}

impl Tunnel {
    /// Dial the server peer as configured (local peer side).
    pub async fn connect(config: &Config) -> Result<Tunnel> {
        match config.tunnel {
            TunnelMode::Tcp => {
                let stream =
                    TcpStream::connect((config.server.as_str(), config.server_port)).await?;
                stream.set_nodelay(true)?;
                Ok(Tunnel::Tcp(stream))
            }
            TunnelMode::Ws | TunnelMode::Wss => {
                let scheme = match config.tunnel {
                    TunnelMode::Wss => "wss",
                    _ => "ws",
                };
                let url = format!("{scheme}://{}:{}/", config.server, config.server_port);
                let (stream, _response) = tokio_tungstenite::connect_async(url)
                    .await
                    .map_err(|e| Error::protocol(format!("websocket connect failed: {e}")))?;
                Ok(Tunnel::Ws(Box::new(WsStream::new(stream))))
            }
        }
    }

    /// Wrap an accepted client connection (server peer side).
    ///
    /// For `ws`/`wss` modes this performs the HTTP upgrade; TLS termination
    /// for `wss` sits in front of the server peer, which always accepts the
    /// plain WebSocket.
    pub async fn accept(stream: TcpStream, mode: TunnelMode) -> Result<Tunnel> {
        match mode {
            TunnelMode::Tcp => Ok(Tunnel::Tcp(stream)),
            TunnelMode::Ws | TunnelMode::Wss => {
                let ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
                    .await
                    .map_err(|e| Error::protocol(format!("websocket accept failed: {e}")))?;
                Ok(Tunnel::Ws(Box::new(WsStream::new(ws))))
            }
        }
    }
}

impl AsyncRead for Tunnel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Tunnel::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Tunnel::Ws(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Tunnel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Tunnel::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Tunnel::Ws(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Tunnel::Tcp(s) => Pin::new(s).poll_flush(cx),
            Tunnel::Ws(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Tunnel::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Tunnel::Ws(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_ws_tunnel_carries_bytes_across_message_boundaries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut tunnel = Tunnel::accept(stream, TunnelMode::Ws).await.unwrap();
            let mut buf = [0u8; 11];
            tunnel.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello there");
            tunnel.write_all(b"general").await.unwrap();
            tunnel.flush().await.unwrap();
        });

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        let mut client = Tunnel::Ws(Box::new(WsStream::new(ws)));
        // two writes become two messages; the server reads one 11-byte span
        client.write_all(b"hello").await.unwrap();
        client.write_all(b" there").await.unwrap();
        client.flush().await.unwrap();

        let mut reply = [0u8; 7];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"general");

        server.await.unwrap();
    }
}

//! The local peer.
//!
//! Listens for SOCKS5 (and optionally HTTP CONNECT) clients, dials the
//! encrypted tunnel to the server peer, and relays. A session only reports
//! success to its client after the tunnel's underlying transport is
//! connected, so the client never sees "established" before bytes can flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::codec::{Decryptor, Encryptor};
use crate::config::Config;
use crate::crypto::MasterKeyCache;
use crate::error::{Error, Result};
use crate::transport::Tunnel;
use crate::{http, relay, socks5};

/// Shared state across all local sessions.
struct Shared {
    config: Config,
    keys: MasterKeyCache,
    next_session: AtomicU64,
}

impl Shared {
    fn session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

/// The local peer: bound listeners plus shared session state.
pub struct LocalNode {
    shared: Arc<Shared>,
    socks_listener: TcpListener,
    http_listener: Option<TcpListener>,
}

impl LocalNode {
    /// Bind the SOCKS5 listener (and the HTTP one when configured).
    pub async fn bind(config: Config) -> Result<LocalNode> {
        config.validate()?;
        let socks_listener =
            TcpListener::bind((config.local_address.as_str(), config.local_port)).await?;
        let http_listener = match config.local_http_port {
            Some(port) => {
                Some(TcpListener::bind((config.local_address.as_str(), port)).await?)
            }
            None => None,
        };
        Ok(LocalNode {
            shared: Arc::new(Shared {
                config,
                keys: MasterKeyCache::new(),
                next_session: AtomicU64::new(1),
            }),
            socks_listener,
            http_listener,
        })
    }

    /// Address the SOCKS5 listener is bound to.
    pub fn socks_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socks_listener.local_addr()?)
    }

    /// Address the HTTP listener is bound to, when enabled.
    pub fn http_addr(&self) -> Option<std::net::SocketAddr> {
        self.http_listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept clients until the process ends.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            "local peer: socks5 on {}, tunnel {} to {}:{}",
            self.socks_listener.local_addr()?,
            self.shared.config.method,
            self.shared.config.server,
            self.shared.config.server_port,
        );

        if let Some(http_listener) = self.http_listener {
            tracing::info!("local peer: http connect on {}", http_listener.local_addr()?);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(accept_loop(http_listener, shared, handle_http_client));
        }

        accept_loop(self.socks_listener, self.shared, handle_socks_client).await;
        Ok(())
    }
}

/// Accept connections forever, one task per session.
async fn accept_loop<F, Fut>(listener: TcpListener, shared: Arc<Shared>, handler: F)
where
    F: Fn(Arc<Shared>, TcpStream, u64) -> Fut + Copy + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = Arc::clone(&shared);
                let sid = shared.session_id();
                tracing::debug!("session {sid}: accepted {peer}");
                tokio::spawn(async move {
                    match handler(shared, stream, sid).await {
                        Ok(()) => tracing::debug!("session {sid}: closed"),
                        Err(e) => tracing::debug!("session {sid}: {e}"),
                    }
                });
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
            }
        }
    }
}

async fn handle_socks_client(shared: Arc<Shared>, mut stream: TcpStream, sid: u64) -> Result<()> {
    stream.set_nodelay(true).ok();

    let request = socks5::handshake(&mut stream).await?;
    tracing::debug!("session {sid}: connect {}", request.address);

    let tunnel = match open_tunnel(&shared).await {
        Ok(tunnel) => tunnel,
        Err(e) => {
            socks5::write_reply(&mut stream, socks5::REPLY_CONNECTION_REFUSED).await?;
            return Err(e);
        }
    };
    socks5::write_reply(&mut stream, socks5::REPLY_SUCCEEDED).await?;

    run_session(shared, stream, tunnel, request.header, Vec::new()).await
}

async fn handle_http_client(shared: Arc<Shared>, mut stream: TcpStream, sid: u64) -> Result<()> {
    stream.set_nodelay(true).ok();

    let request = http::handshake(&mut stream).await?;
    tracing::debug!("session {sid}: connect {} (http)", request.address);

    let tunnel = match open_tunnel(&shared).await {
        Ok(tunnel) => tunnel,
        Err(e) => {
            http::write_bad_gateway(&mut stream).await?;
            return Err(e);
        }
    };
    http::write_established(&mut stream).await?;

    run_session(shared, stream, tunnel, request.address.to_bytes(), request.excess).await
}

/// Dial the tunnel transport, bounded by the inactivity deadline.
async fn open_tunnel(shared: &Shared) -> Result<Tunnel> {
    timeout(shared.config.idle_timeout(), Tunnel::connect(&shared.config))
        .await
        .map_err(|_| Error::IdleTimeout)?
}

/// Seal the address header (plus any pipelined client bytes) into the
/// freshly dialed tunnel, then hand everything to the relay.
async fn run_session(
    shared: Arc<Shared>,
    stream: TcpStream,
    mut tunnel: Tunnel,
    header: Vec<u8>,
    excess: Vec<u8>,
) -> Result<()> {
    let config = &shared.config;
    let master = shared.keys.get(&config.password, config.method.key_len());

    let mut encryptor = Encryptor::new(config.method, &master)?;
    let decryptor = Decryptor::new(config.method, master);

    let mut first = encryptor.encrypt(&header)?;
    if !excess.is_empty() {
        first.extend(encryptor.encrypt(&excess)?);
    }
    tunnel.write_all(&first).await?;
    tunnel.flush().await?;

    relay::pipe(stream, tunnel, encryptor, decryptor, config.idle_timeout()).await
}

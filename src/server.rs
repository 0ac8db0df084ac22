//! The server peer.
//!
//! Accepts tunnel connections, opens the encrypted stream, parses the first
//! plaintext bytes as the destination header, and relays plaintext to the
//! ultimate destination. Decrypted bytes that arrive between the address
//! header and a successful upstream connect are held in order and flushed
//! once the upstream is up.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::addr::Address;
use crate::codec::{Decryptor, Encryptor};
use crate::config::Config;
use crate::crypto::MasterKeyCache;
use crate::dns::Resolver;
use crate::error::{Error, Result};
use crate::relay;
use crate::transport::Tunnel;

/// Shared state across all server sessions.
struct Shared {
    config: Config,
    keys: MasterKeyCache,
    resolver: Resolver,
    next_session: AtomicU64,
}

/// The server peer: a bound listener plus shared session state.
pub struct ServerNode {
    shared: Arc<Shared>,
    listener: TcpListener,
}

impl ServerNode {
    /// Bind the tunnel listener on `server:server_port`.
    pub async fn bind(config: Config) -> Result<ServerNode> {
        config.validate()?;
        let listener = TcpListener::bind((config.server.as_str(), config.server_port)).await?;
        Ok(ServerNode {
            shared: Arc::new(Shared {
                config,
                keys: MasterKeyCache::new(),
                resolver: Resolver::new(),
                next_session: AtomicU64::new(1),
            }),
            listener,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept tunnels until the process ends.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            "server peer: listening on {}, method {}",
            self.listener.local_addr()?,
            self.shared.config.method,
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    let sid = shared.next_session.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("session {sid}: accepted {peer}");
                    tokio::spawn(async move {
                        match handle_session(shared, stream, sid).await {
                            Ok(()) => tracing::debug!("session {sid}: closed"),
                            // auth failures log like any other teardown; the
                            // peer observes nothing but a closed socket
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
}

async fn handle_session(shared: Arc<Shared>, stream: TcpStream, sid: u64) -> Result<()> {
    stream.set_nodelay(true).ok();
    let config = &shared.config;
    let idle = config.idle_timeout();

    let mut tunnel = Tunnel::accept(stream, config.tunnel).await?;

    let master = shared.keys.get(&config.password, config.method.key_len());
    let encryptor = Encryptor::new(config.method, &master)?;
    let mut decryptor = Decryptor::new_held(config.method, master);

    // drive the decryptor until the first frame's payload has verified
    let first_payload = {
        let mut buf = vec![0u8; 4096];
        loop {
            let n = match timeout(idle, tunnel.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::IdleTimeout),
            };
            if n == 0 {
                return Err(Error::protocol("tunnel closed before address header"));
            }
            decryptor.feed(&buf[..n])?;
            if let Some(first) = decryptor.take_first_payload() {
                break first;
            }
        }
    };

    let (address, consumed) = Address::parse(&first_payload)?;
    tracing::debug!("session {sid}: connect {address}");

    let target = resolve_target(&shared.resolver, &address).await?;
    let mut upstream = match timeout(idle, TcpStream::connect(target)).await {
        Ok(result) => result?,
        Err(_) => return Err(Error::IdleTimeout),
    };
    upstream.set_nodelay(true).ok();

    // flush, in order: payload bytes that rode in with the header, then
    // everything decrypted while the upstream connect was in flight
    if first_payload.len() > consumed {
        upstream.write_all(&first_payload[consumed..]).await?;
    }
    let held = decryptor.resume();
    if !held.is_empty() {
        upstream.write_all(&held).await?;
    }

    relay::pipe(upstream, tunnel, encryptor, decryptor, idle).await
}

/// Map a parsed address to a socket address, resolving domains to IPv4.
async fn resolve_target(resolver: &Resolver, address: &Address) -> Result<SocketAddr> {
    let target = match address {
        Address::Ipv4(ip, port) => SocketAddr::new(IpAddr::V4(*ip), *port),
        Address::Ipv6(ip, port) => SocketAddr::new(IpAddr::V6(*ip), *port),
        Address::Domain(name, port) => {
            let ip = resolver.resolve(name).await?;
            SocketAddr::new(IpAddr::V4(ip), *port)
        }
    };
    Ok(target)
}

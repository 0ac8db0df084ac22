//! Hostname resolution for the server peer.
//!
//! A thin adapter over the system resolver: `resolve(host) -> Ipv4Addr`,
//! with a bounded TTL cache and single-flight de-duplication so a burst of
//! sessions to one destination shares a single outstanding lookup. Literal
//! IPv4 addresses pass through untouched; only A records are consulted.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Cache capacity; the oldest entry is evicted past this.
const CACHE_CAPACITY: usize = 100;

/// How long a resolved address stays valid.
const CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    addr: Ipv4Addr,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > CACHE_TTL
    }
}

#[derive(Default)]
struct Inner {
    cache: Mutex<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Ipv4Addr>>>>,
}

/// Shared resolver handle; cloning shares cache and in-flight table.
#[derive(Clone, Default)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    /// Create a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `host` to an IPv4 address.
    ///
    /// Failures are fatal for the calling session; nothing is retried here.
    pub async fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(ip);
        }

        if let Some(hit) = self.cached(host) {
            return Ok(hit);
        }

        let cell = {
            let mut inflight = self.inner.inflight.lock();
            Arc::clone(inflight.entry(host.to_owned()).or_default())
        };

        let result = cell
            .get_or_try_init(|| Self::lookup(host.to_owned()))
            .await
            .copied();

        // the table entry only exists to merge concurrent callers; drop it
        // so expiry can trigger a fresh lookup later
        self.inner.inflight.lock().remove(host);

        let addr = result?;
        self.store(host, addr);
        Ok(addr)
    }

    fn cached(&self, host: &str) -> Option<Ipv4Addr> {
        let mut cache = self.inner.cache.lock();
        match cache.get(host) {
            Some(entry) if !entry.is_expired() => {
                tracing::trace!("dns cache hit for {host}");
                Some(entry.addr)
            }
            Some(_) => {
                cache.remove(host);
                None
            }
            None => None,
        }
    }

    fn store(&self, host: &str, addr: Ipv4Addr) {
        let mut cache = self.inner.cache.lock();
        if cache.len() >= CACHE_CAPACITY && !cache.contains_key(host) {
            cache.retain(|_, entry| !entry.is_expired());
            if cache.len() >= CACHE_CAPACITY {
                // still full of live entries: drop the oldest
                if let Some(oldest) = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.cached_at)
                    .map(|(name, _)| name.clone())
                {
                    cache.remove(&oldest);
                }
            }
        }
        cache.insert(
            host.to_owned(),
            CacheEntry {
                addr,
                cached_at: Instant::now(),
            },
        );
    }

    async fn lookup(host: String) -> Result<Ipv4Addr> {
        let addrs = tokio::net::lookup_host((host.as_str(), 0u16))
            .await
            .map_err(|e| Error::dns(format!("lookup for {host} failed: {e}")))?;
        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| Error::dns(format!("no A record for {host}")))
    }
}

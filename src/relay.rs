//! The full-duplex relay at the heart of every session.
//!
//! One task drives both directions of a session to completion: plaintext
//! from the clear socket is sealed into the tunnel, ciphertext from the
//! tunnel is opened onto the clear socket. The first direction to finish —
//! EOF, I/O error, authentication failure, or the inactivity deadline —
//! tears the whole session down: the losing direction is cancelled and both
//! sockets drop together, so nothing is ever left half-open.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::codec::{Decryptor, Encryptor};
use crate::crypto::MAX_PAYLOAD;
use crate::error::{Error, Result};

/// Bytes pulled per read on the clear side. One read never produces more
/// than one frame.
const READ_CHUNK: usize = MAX_PAYLOAD;

/// Pipe `clear` and `tunnel` into each other until either side ends.
///
/// `encryptor` seals clear-to-tunnel traffic (any pending salt or preloaded
/// frames have already been written by the caller); `decryptor` opens
/// tunnel-to-clear traffic and may be mid-stream. Every read on either side
/// is bounded by `idle`; the deadline firing ends the session like any
/// other fatal event.
pub async fn pipe<C, T>(
    clear: C,
    tunnel: T,
    mut encryptor: Encryptor,
    mut decryptor: Decryptor,
    idle: Duration,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut clear_rd, mut clear_wr) = tokio::io::split(clear);
    let (mut tunnel_rd, mut tunnel_wr) = tokio::io::split(tunnel);

    let outbound = async {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = read_idle(&mut clear_rd, &mut buf, idle).await?;
            if n == 0 {
                break;
            }
            let sealed = encryptor.encrypt(&buf[..n])?;
            tunnel_wr.write_all(&sealed).await?;
            tunnel_wr.flush().await?;
        }
        let _ = tunnel_wr.shutdown().await;
        Ok::<_, Error>(())
    };

    let inbound = async {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = read_idle(&mut tunnel_rd, &mut buf, idle).await?;
            if n == 0 {
                break;
            }
            let plain = decryptor.feed(&buf[..n])?;
            if !plain.is_empty() {
                clear_wr.write_all(&plain).await?;
            }
        }
        let _ = clear_wr.shutdown().await;
        Ok::<_, Error>(())
    };

    // whichever direction settles first decides the session's fate; the
    // other future is dropped, and with it the remaining socket halves
    tokio::select! {
        result = outbound => result,
        result = inbound => result,
    }
}

/// A single read bounded by the inactivity deadline.
async fn read_idle<R>(reader: &mut R, buf: &mut [u8], idle: Duration) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    match timeout(idle, reader.read(buf)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::IdleTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherKind, MasterKey};
    use tokio::io::duplex;

    const KIND: CipherKind = CipherKind::Aes128Gcm;

    fn master() -> MasterKey {
        MasterKey::derive("test", KIND.key_len())
    }

    #[tokio::test]
    async fn test_pipe_round_trips_both_directions() {
        // clear client <-> [pipe] <-> tunnel peer (hand-rolled codec)
        let (client, clear_side) = duplex(64 * 1024);
        let (tunnel_side, peer) = duplex(64 * 1024);

        let enc = Encryptor::new(KIND, &master()).unwrap();
        let dec = Decryptor::new(KIND, master());
        let relay = tokio::spawn(pipe(clear_side, tunnel_side, enc, dec, Duration::from_secs(5)));

        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        let (mut peer_rd, mut peer_wr) = tokio::io::split(peer);

        // client -> tunnel: peer decrypts what the relay sealed
        client_wr.write_all(b"over the wire").await.unwrap();
        let mut peer_dec = Decryptor::new(KIND, master());
        let mut got = Vec::new();
        let mut buf = [0u8; 4096];
        while got.len() < 13 {
            let n = peer_rd.read(&mut buf).await.unwrap();
            got.extend(peer_dec.feed(&buf[..n]).unwrap());
        }
        assert_eq!(got, b"over the wire");

        // tunnel -> client: relay opens what the peer sealed
        let mut peer_enc = Encryptor::new(KIND, &master()).unwrap();
        let sealed = peer_enc.encrypt(b"and back").unwrap();
        peer_wr.write_all(&sealed).await.unwrap();
        let mut reply = [0u8; 8];
        client_rd.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"and back");

        // client EOF ends the whole session
        drop(client_wr);
        drop(client_rd);
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_session() {
        let (_client, clear_side) = duplex(1024);
        let (tunnel_side, _peer) = duplex(1024);

        let enc = Encryptor::new(KIND, &master()).unwrap();
        let dec = Decryptor::new(KIND, master());

        let err = pipe(clear_side, tunnel_side, enc, dec, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_idle_timeout());
    }

    #[tokio::test]
    async fn test_garbage_from_tunnel_is_fatal() {
        let (client, clear_side) = duplex(1024);
        let (tunnel_side, peer) = duplex(1024);

        let enc = Encryptor::new(KIND, &master()).unwrap();
        let dec = Decryptor::new(KIND, master());
        let relay = tokio::spawn(pipe(clear_side, tunnel_side, enc, dec, Duration::from_secs(5)));

        let (_peer_rd, mut peer_wr) = tokio::io::split(peer);
        // wrong salt, then a bogus frame: authentication must fail
        peer_wr.write_all(&[0xAAu8; 64]).await.unwrap();

        let err = relay.await.unwrap().unwrap_err();
        assert!(err.is_auth_failure());
        drop(client);
    }
}

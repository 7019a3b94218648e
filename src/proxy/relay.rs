// ────────────────────────────────
// src/proxy/relay.rs
// Bidirectional byte pipe between two established sockets.
// ────────────────────────────────
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub to_backend: u64,
    pub to_client: u64,
}

/// Copies bytes in both directions until either side reaches end-of-stream
/// or fails. Both directions run as futures inside the calling connection
/// task rather than as separate spawned tasks. Whichever direction finishes
/// first ends the relay, and both sockets are closed when they are dropped
/// on return.
pub async fn relay(client: TcpStream, backend: TcpStream) -> (RelayStats, Option<io::Error>) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut backend_read, mut backend_write) = backend.into_split();

    let mut stats = RelayStats::default();

    let outcome = {
        let client_to_backend = pipe(&mut client_read, &mut backend_write, &mut stats.to_backend);
        let backend_to_client = pipe(&mut backend_read, &mut client_write, &mut stats.to_client);
        tokio::pin!(client_to_backend, backend_to_client);

        tokio::select! {
            res = &mut client_to_backend => res,
            res = &mut backend_to_client => res,
        }
    };

    // Flush FIN to both peers; errors here just mean the peer is already gone.
    let _ = client_write.shutdown().await;
    let _ = backend_write.shutdown().await;

    (stats, outcome.err())
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        *copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (connected.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_relay_copies_both_directions() {
        // client_peer <-> client_side | relay | backend_side <-> backend_peer
        let (mut client_peer, client_side) = pair().await;
        let (backend_side, mut backend_peer) = pair().await;

        let relay_task = tokio::spawn(relay(client_side, backend_side));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend_peer.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_peer);
        let (stats, _) = relay_task.await.unwrap();
        assert_eq!(stats, RelayStats { to_backend: 4, to_client: 5 });

        // the backend side is closed as well
        let mut rest = Vec::new();
        backend_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_backend_close_tears_down_client() {
        let (mut client_peer, client_side) = pair().await;
        let (backend_side, backend_peer) = pair().await;

        let relay_task = tokio::spawn(relay(client_side, backend_side));
        drop(backend_peer);

        relay_task.await.unwrap();
        let mut rest = Vec::new();
        let read = client_peer.read_to_end(&mut rest).await;
        assert!(read.map(|n| n == 0).unwrap_or(true));
    }
}

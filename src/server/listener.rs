// ────────────────────────────────
// src/server/listener.rs
// Low-level TCP bind shared by the proxy listener and the admin server.
// ────────────────────────────────
use anyhow::{Context, Result};
use tokio::net::{TcpListener, ToSocketAddrs};

pub async fn bind_tcp<A>(addr: A) -> Result<TcpListener>
where
    A: ToSocketAddrs + std::fmt::Debug,
{
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind listener on {:?}", addr))?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind_tcp("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = bind_tcp("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();
        assert!(bind_tcp(addr).await.is_err());
    }
}

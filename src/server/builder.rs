// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use anyhow::{anyhow, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use tokio::net::TcpListener;
use tower::Service;

/// Builder for the admin HTTP server so `App` can inject its handler.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new() -> Self {
        Self { handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Serves on an already bound listener until the task is dropped.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let handler = self
            .handler
            .ok_or_else(|| anyhow!("handler must be set via with_handler()"))?;

        tracing::info!("Admin HTTP server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!(%err, "admin accept error");
                    continue;
                }
            };
            let svc = handler.clone();

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "admin connection error");
                }
            });
        }
    }
}

impl<H> Default for ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────
// src/proxy/proxy.rs
// Accept loop and per-connection dispatch: select, dial, relay.
// ────────────────────────────────

use super::backend::Backend;
use super::registry::BackendRegistry;
use super::relay::{relay, RelayStats};
use crate::config::GeneralConfig;
use crate::load_balancer::BackendSelector;
use crate::metrics::{ConnectionOutcome, MetricsCollector, Timer};
use crate::retry::RetryStrategy;
use anyhow::Result;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};

/// Lifecycle of one proxied client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    ServerSelected,
    Dialed,
    Relaying,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Accepted => write!(f, "accepted"),
            ConnectionState::ServerSelected => write!(f, "server_selected"),
            ConnectionState::Dialed => write!(f, "dialed"),
            ConnectionState::Relaying => write!(f, "relaying"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No live backends available")]
    NoLiveBackends,

    #[error("Failed to connect to backend {backend}: {source}")]
    Dial {
        backend: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to backend {backend} after {timeout:?}")]
    DialTimeout { backend: String, timeout: Duration },
}

pub struct Proxy {
    registry: Arc<BackendRegistry>,
    selector: BackendSelector,
    retry: RetryStrategy,
    metrics: Arc<MetricsCollector>,
    connect_timeout: Duration,
    connection_limit: Option<Arc<Semaphore>>,
}

impl Proxy {
    pub fn new(
        selector: BackendSelector,
        retry: RetryStrategy,
        metrics: Arc<MetricsCollector>,
        general: &GeneralConfig,
    ) -> Self {
        let connection_limit = match general.max_connections {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Self {
            registry: selector.registry().clone(),
            selector,
            retry,
            metrics,
            connect_timeout: general.connection_timeout(),
            connection_limit,
        }
    }

    /// Accepts connections until the task is dropped. A failed accept is
    /// logged and skipped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            "Load balancer listening on {} using {}",
            listener.local_addr()?,
            self.selector.strategy_name()
        );

        loop {
            let permit = match &self.connection_limit {
                Some(limit) => Some(limit.clone().acquire_owned().await?),
                None => None,
            };

            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    self.metrics.record_accept_error();
                    warn!(%err, "Error accepting connection");
                    continue;
                }
            };

            let proxy = self.clone();
            let span = tracing::info_span!(
                "connection",
                id = %uuid::Uuid::new_v4(),
                %peer
            );

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _ = proxy.handle_connection(stream, peer).await;
                }
                .instrument(span),
            );
        }
    }

    pub async fn handle_connection(
        &self,
        client: TcpStream,
        peer: SocketAddr,
    ) -> Result<RelayStats, ProxyError> {
        debug!(state = %ConnectionState::Accepted, %peer);
        self.metrics.increment_active_connections();

        let result = self.dispatch(client).await;

        self.metrics.decrement_active_connections();
        match &result {
            Ok(stats) => debug!(
                state = %ConnectionState::Closed,
                to_backend = stats.to_backend,
                to_client = stats.to_client
            ),
            Err(ProxyError::NoLiveBackends) => {
                warn!(%peer, "Closing client connection: no live backend to serve it")
            }
            Err(err) => error!(%peer, %err, "Error connecting to target server"),
        }
        result
    }

    /// Picks a live backend, retrying with backoff a bounded number of times
    /// while none is alive.
    pub async fn select_backend(&self) -> Result<Arc<Backend>, ProxyError> {
        self.retry
            .execute_option(|| async { self.selector.pick() })
            .await
            .map_err(|_| ProxyError::NoLiveBackends)
    }

    async fn dispatch(&self, client: TcpStream) -> Result<RelayStats, ProxyError> {
        let timer = Timer::new();

        let backend = match self.select_backend().await {
            Ok(backend) => backend,
            Err(err) => {
                self.metrics.record_selection_failure();
                return Err(err);
            }
        };
        debug!(state = %ConnectionState::ServerSelected, backend = %backend.address);

        // Held until this function returns, on every path.
        let _dispatched = DispatchGuard::new(&self.registry, &backend, &self.metrics);

        let upstream = match timeout(self.connect_timeout, TcpStream::connect(&backend.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.dial_failed(&backend, &timer);
                return Err(ProxyError::Dial {
                    backend: backend.address.clone(),
                    source,
                });
            }
            Err(_) => {
                self.dial_failed(&backend, &timer);
                return Err(ProxyError::DialTimeout {
                    backend: backend.address.clone(),
                    timeout: self.connect_timeout,
                });
            }
        };
        debug!(state = %ConnectionState::Dialed, backend = %backend.address);

        let _ = client.set_nodelay(true);
        let _ = upstream.set_nodelay(true);

        debug!(state = %ConnectionState::Relaying);
        let (stats, relay_err) = relay(client, upstream).await;
        if let Some(err) = relay_err {
            debug!(%err, backend = %backend.address, "Relay ended with I/O error");
        }

        backend.record_transfer(stats.to_backend, stats.to_client);
        self.metrics
            .record_transfer(&backend.address, stats.to_backend, stats.to_client);
        self.metrics
            .record_connection(&backend.address, ConnectionOutcome::Relayed, timer.elapsed());

        Ok(stats)
    }

    fn dial_failed(&self, backend: &Backend, timer: &Timer) {
        backend.record_failure();
        self.metrics
            .record_connection(&backend.address, ConnectionOutcome::DialFailed, timer.elapsed());
    }
}

/// Counts a connection against a backend for exactly as long as it lives.
struct DispatchGuard<'a> {
    registry: &'a BackendRegistry,
    backend: &'a Backend,
    metrics: &'a MetricsCollector,
}

impl<'a> DispatchGuard<'a> {
    fn new(registry: &'a BackendRegistry, backend: &'a Backend, metrics: &'a MetricsCollector) -> Self {
        registry.increase_connections(backend);
        metrics.update_backend_connections(&backend.address, backend.active_connections());
        Self {
            registry,
            backend,
            metrics,
        }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.registry.decrease_connections(self.backend);
        self.metrics
            .update_backend_connections(&self.backend.address, self.backend.active_connections());
    }
}

// src/app.rs
use crate::config::Config;
use crate::health::{bootstrap_sweep, spawn_monitors, HealthProbe, HttpProbe};
use crate::load_balancer::{create_load_balancer, BackendSelector};
use crate::metrics::{MetricsCollector, MetricsRegistry};
use crate::proxy::{BackendRegistry, Proxy};
use crate::retry::RetryStrategy;
use crate::server::{bind_tcp, AdminHandler, ServerBuilder};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("No available servers. Health check failed on each of the {0} configured backends")]
    NoLiveBackends(usize),
}

/// Process-wide state, built once at startup and handed to every component.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<BackendRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub metrics_registry: Arc<MetricsRegistry>,
}

pub struct App {
    config: Config,
    context: AppContext,
    probe: Arc<dyn HealthProbe>,
}

impl App {
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let probe = Arc::new(HttpProbe::new()?);
        Self::bootstrap_with_probe(config, probe).await
    }

    /// Builds the registry and runs the bootstrap sweep. Fails without
    /// binding anything when no backend answers its health check.
    pub async fn bootstrap_with_probe(config: Config, probe: Arc<dyn HealthProbe>) -> Result<Self> {
        config.validate()?;

        let metrics_registry = Arc::new(MetricsRegistry::new()?);
        let metrics = metrics_registry.collector();
        let registry = Arc::new(BackendRegistry::from_config(
            &config.backend_servers,
            &config.health_check,
        )?);

        if config.health_check.enabled {
            let alive = bootstrap_sweep(
                &registry,
                probe.clone(),
                config.health_check.timeout(),
                Some(metrics.as_ref()),
            )
            .await;

            if alive == 0 {
                return Err(StartupError::NoLiveBackends(registry.len()).into());
            }
        } else {
            warn!("Health checks disabled, every backend is treated as alive");
            for backend in registry.all_backends() {
                registry.set_alive(backend, true);
                metrics.update_backend_health(&backend.address, true);
            }
            metrics.update_backend_counts(registry.alive_count(), registry.len());
        }

        Ok(Self {
            config,
            context: AppContext {
                registry,
                metrics,
                metrics_registry,
            },
            probe,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Binds the configured address and proxies until the task is dropped.
    pub async fn run(self) -> Result<()> {
        let listener = bind_tcp(self.config.general.bind_address.as_str()).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let ctx = self.context;

        let monitors = if self.config.health_check.enabled {
            spawn_monitors(
                &ctx.registry,
                self.probe.clone(),
                &self.config.health_check,
                Some(ctx.metrics.clone()),
            )
        } else {
            Vec::new()
        };

        let selector = BackendSelector::new(
            ctx.registry.clone(),
            create_load_balancer(self.config.algorithm()),
        );

        if self.config.metrics.enabled {
            let addr: SocketAddr = ([0, 0, 0, 0], self.config.metrics.port).into();
            let handler = AdminHandler::new(
                ctx.registry.clone(),
                ctx.metrics_registry.clone(),
                &self.config.metrics.path,
                selector.strategy_name(),
            );
            let admin_listener = bind_tcp(addr).await?;

            info!(
                "Metrics available on http://{}{}",
                addr, self.config.metrics.path
            );
            tokio::spawn(async move {
                let server = ServerBuilder::new().with_handler(handler);
                if let Err(e) = server.serve_on(admin_listener).await {
                    error!("Admin server error: {}", e);
                }
            });
        }

        let proxy = Arc::new(Proxy::new(
            selector,
            RetryStrategy::new(self.config.retry.clone()),
            ctx.metrics.clone(),
            &self.config.general,
        ));

        let result = proxy.serve(listener).await;

        for monitor in monitors {
            monitor.abort();
        }
        result
    }
}

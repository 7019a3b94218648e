// src/main.rs
use anyhow::Result;
use tcp_load_balancer::{config, App};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = config::load_config(&config_path).await?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("tcp_load_balancer={}", config.general.log_level))
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Loaded configuration from: {}", config_path);

    let app = match App::bootstrap(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup aborted: {:#}", e);
            return Err(e);
        }
    };

    tokio::select! {
        res = app.run() => res,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

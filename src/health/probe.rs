// src/health/probe.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Liveness probe against a single URL. `Ok(())` means alive.
///
/// Errors are for logging only; callers never stop probing because of one.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<(), ProbeError>;
}

/// Plain HTTP GET, alive on any 2xx status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, ProbeError> {
        // Probes go straight to the backend, never through an env-configured proxy.
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &Url, limit: Duration) -> Result<(), ProbeError> {
        let request = self.client.get(url.as_str()).timeout(limit).send();

        match timeout(limit, request).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(ProbeError::Status(status.as_u16()))
                }
            }
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout(limit)),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(limit)),
        }
    }
}

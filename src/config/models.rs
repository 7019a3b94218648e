// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bind address wasn't provided")]
    MissingBindAddress,

    #[error("backend servers weren't provided")]
    NoBackends,

    #[error("missing address for backend server #{0}")]
    MissingAddress(usize),

    #[error("backend server {0} has weight 0, weight must be at least 1")]
    ZeroWeight(String),

    #[error("provided strategy {0} is invalid. Valid strategies: RoundRobin, WeightedRoundRobin, LeastConnections")]
    InvalidStrategy(String),

    #[error("health check interval for backend {0} must be greater than zero")]
    ZeroHealthInterval(String),

    #[error("health check timeout must be greater than zero")]
    ZeroHealthTimeout,

    #[error("backend connection timeout must be greater than zero")]
    ZeroConnectionTimeout,

    #[error("health check url for backend {address} is invalid: {reason}")]
    InvalidHealthEndpoint { address: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub backend_servers: Vec<BackendConfig>,

    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.bind_address.trim().is_empty() {
            return Err(ConfigError::MissingBindAddress);
        }

        if self.backend_servers.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        if self.strategy.parse::<LoadBalancerAlgorithm>().is_err() {
            return Err(ConfigError::InvalidStrategy(self.strategy.clone()));
        }

        if self.health_check.timeout_ms == 0 {
            return Err(ConfigError::ZeroHealthTimeout);
        }

        if self.general.connection_timeout_ms == 0 {
            return Err(ConfigError::ZeroConnectionTimeout);
        }

        for (i, backend) in self.backend_servers.iter().enumerate() {
            if backend.address.trim().is_empty() {
                return Err(ConfigError::MissingAddress(i));
            }
            if backend.weight == 0 {
                return Err(ConfigError::ZeroWeight(backend.address.clone()));
            }
            if backend.health_check_interval(&self.health_check).is_zero() {
                return Err(ConfigError::ZeroHealthInterval(backend.address.clone()));
            }
            backend
                .health_check_url(&self.health_check)
                .map_err(|e| ConfigError::InvalidHealthEndpoint {
                    address: backend.address.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Parsed strategy. Unknown values fall back to round robin.
    pub fn algorithm(&self) -> LoadBalancerAlgorithm {
        self.strategy.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Unsupported load balancing strategy {:?}, falling back to round robin",
                self.strategy
            );
            LoadBalancerAlgorithm::RoundRobin
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub bind_address: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cap on concurrently proxied client connections, 0 disables the cap.
    #[serde(default)]
    pub max_connections: usize,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl GeneralConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub address: String,

    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Advisory only, reported on the status endpoint.
    #[serde(default)]
    pub max_connections: usize,

    #[serde(default)]
    pub hc_endpoint: Option<String>,

    #[serde(default)]
    pub hc_interval_ms: Option<u64>,
}

impl BackendConfig {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            max_connections: 0,
            hc_endpoint: None,
            hc_interval_ms: None,
        }
    }

    pub fn health_check_endpoint<'a>(&'a self, defaults: &'a HealthCheckConfig) -> &'a str {
        self.hc_endpoint.as_deref().unwrap_or(&defaults.endpoint)
    }

    pub fn health_check_interval(&self, defaults: &HealthCheckConfig) -> Duration {
        Duration::from_millis(self.hc_interval_ms.unwrap_or(defaults.interval_ms))
    }

    pub fn health_check_url(&self, defaults: &HealthCheckConfig) -> Result<Url, url::ParseError> {
        health_check_url(&self.address, self.health_check_endpoint(defaults))
    }
}

/// Builds `http://<address><endpoint>`, tolerating an endpoint without a leading slash.
pub fn health_check_url(address: &str, endpoint: &str) -> Result<Url, url::ParseError> {
    let separator = if endpoint.starts_with('/') { "" } else { "/" };
    Url::parse(&format!("http://{}{}{}", address, separator, endpoint))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,

    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_health_endpoint(),
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
            unhealthy_threshold: default_threshold(),
            healthy_threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalancerAlgorithm {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
}

impl FromStr for LoadBalancerAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RoundRobin" | "round_robin" => Ok(Self::RoundRobin),
            "WeightedRoundRobin" | "weighted_round_robin" => Ok(Self::WeightedRoundRobin),
            "LeastConnections" | "least_connections" => Ok(Self::LeastConnections),
            other => Err(ConfigError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for LoadBalancerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "RoundRobin"),
            Self::WeightedRoundRobin => write!(f, "WeightedRoundRobin"),
            Self::LeastConnections => write!(f, "LeastConnections"),
        }
    }
}

fn default_strategy() -> String {
    LoadBalancerAlgorithm::RoundRobin.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

fn default_health_interval_ms() -> u64 {
    10_000
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_threshold() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    10
}

fn default_backoff_max_ms() -> u64 {
    200
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

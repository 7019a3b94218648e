// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

/// Outcome label for a finished client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Relayed,
    DialFailed,
    Rejected,
}

impl ConnectionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Relayed => "relayed",
            Self::DialFailed => "dial_failed",
            Self::Rejected => "rejected",
        }
    }
}

pub struct MetricsCollector {
    // Connection metrics
    pub connections_total: IntCounterVec,
    pub connection_duration_seconds: HistogramVec,
    pub bytes_transferred_total: IntCounterVec,

    // Backend metrics
    pub backend_connections_active: IntGaugeVec,
    pub backend_health_status: IntGaugeVec,
    pub health_checks_total: IntCounterVec,
    pub health_check_duration_seconds: HistogramVec,

    // Listener metrics
    pub selection_failures_total: IntCounter,
    pub accept_errors_total: IntCounter,

    // System metrics
    pub active_connections: IntGauge,
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let connections_total = IntCounterVec::new(
            Opts::new("lb_connections_total", "Total client connections by outcome"),
            &["backend", "outcome"],
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let connection_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_connection_duration_seconds",
                "Relayed connection lifetime in seconds",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(connection_duration_seconds.clone()))?;

        let bytes_transferred_total = IntCounterVec::new(
            Opts::new("lb_bytes_transferred_total", "Bytes relayed per direction"),
            &["backend", "direction"],
        )?;
        registry.register(Box::new(bytes_transferred_total.clone()))?;

        let backend_connections_active = IntGaugeVec::new(
            Opts::new(
                "lb_backend_connections_active",
                "Active backend connections",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_connections_active.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=alive, 0=dead)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let health_checks_total = IntCounterVec::new(
            Opts::new("lb_health_checks_total", "Health probes by result"),
            &["backend", "result"],
        )?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let health_check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_health_check_duration_seconds",
                "Health probe response time in seconds",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(health_check_duration_seconds.clone()))?;

        let selection_failures_total = IntCounter::new(
            "lb_selection_failures_total",
            "Connections closed because no live backend could be selected",
        )?;
        registry.register(Box::new(selection_failures_total.clone()))?;

        let accept_errors_total =
            IntCounter::new("lb_accept_errors_total", "Failed accept calls")?;
        registry.register(Box::new(accept_errors_total.clone()))?;

        let active_connections =
            IntGauge::new("lb_active_connections", "Total active client connections")?;
        registry.register(Box::new(active_connections.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of live backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            connections_total,
            connection_duration_seconds,
            bytes_transferred_total,
            backend_connections_active,
            backend_health_status,
            health_checks_total,
            health_check_duration_seconds,
            selection_failures_total,
            accept_errors_total,
            active_connections,
            healthy_backends,
            total_backends,
        })
    }

    pub fn record_connection(
        &self,
        backend: &str,
        outcome: ConnectionOutcome,
        duration: Duration,
    ) {
        self.connections_total
            .with_label_values(&[backend, outcome.as_str()])
            .inc();

        if outcome == ConnectionOutcome::Relayed {
            self.connection_duration_seconds
                .with_label_values(&[backend])
                .observe(duration.as_secs_f64());
        }
    }

    pub fn record_transfer(&self, backend: &str, to_backend: u64, to_client: u64) {
        self.bytes_transferred_total
            .with_label_values(&[backend, "to_backend"])
            .inc_by(to_backend);
        self.bytes_transferred_total
            .with_label_values(&[backend, "to_client"])
            .inc_by(to_client);
    }

    pub fn record_selection_failure(&self) {
        self.selection_failures_total.inc();
        self.connections_total
            .with_label_values(&["none", ConnectionOutcome::Rejected.as_str()])
            .inc();
    }

    pub fn record_accept_error(&self) {
        self.accept_errors_total.inc();
    }

    pub fn record_health_check(&self, backend: &str, alive: bool, response_time: Duration) {
        let result = if alive { "success" } else { "failure" };
        self.health_checks_total
            .with_label_values(&[backend, result])
            .inc();
        self.health_check_duration_seconds
            .with_label_values(&[backend])
            .observe(response_time.as_secs_f64());
    }

    pub fn update_backend_connections(&self, backend: &str, count: usize) {
        self.backend_connections_active
            .with_label_values(&[backend])
            .set(count as i64);
    }

    pub fn update_backend_health(&self, backend: &str, alive: bool) {
        let value = if alive { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn increment_active_connections(&self) {
        self.active_connections.inc();
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.dec();
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

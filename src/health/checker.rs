// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::health::{HealthProbe, HealthTracker};
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendRegistry};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend: String,
    pub alive: bool,
    pub response_time: Duration,
    pub error: Option<String>,
}

pub async fn probe_backend(
    probe: &dyn HealthProbe,
    backend: &Backend,
    timeout: Duration,
) -> HealthCheckResult {
    let start = Instant::now();
    let result = probe.probe(&backend.health_check_url, timeout).await;
    backend.mark_checked();

    HealthCheckResult {
        backend: backend.address.clone(),
        alive: result.is_ok(),
        response_time: start.elapsed(),
        error: result.err().map(|e| e.to_string()),
    }
}

/// Probes every backend once, concurrently, and writes the results straight
/// into the registry. Returns the number of live backends.
pub async fn bootstrap_sweep(
    registry: &Arc<BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    metrics: Option<&MetricsCollector>,
) -> usize {
    let mut tasks = Vec::new();

    for backend in registry.all_backends() {
        let backend = backend.clone();
        let probe = probe.clone();
        tasks.push(tokio::spawn(async move {
            let result = probe_backend(probe.as_ref(), &backend, timeout).await;
            (backend, result)
        }));
    }

    for joined in futures::future::join_all(tasks).await {
        match joined {
            Ok((backend, result)) => {
                if result.alive {
                    debug!(
                        "Backend {} is alive, answered in {:?}",
                        result.backend, result.response_time
                    );
                } else {
                    error!(
                        "Unable to health check backend {}: {}",
                        result.backend,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }

                registry.set_alive(&backend, result.alive);

                if let Some(metrics) = metrics {
                    metrics.record_health_check(
                        &backend.address,
                        result.alive,
                        result.response_time,
                    );
                    metrics.update_backend_health(&backend.address, result.alive);
                }
            }
            Err(e) => error!("Health check task join error: {}", e),
        }
    }

    let alive = registry.alive_count();
    if let Some(metrics) = metrics {
        metrics.update_backend_counts(alive, registry.len());
    }

    info!(
        "Bootstrap health sweep complete: {}/{} backends alive",
        alive,
        registry.len()
    );
    alive
}

/// Periodic liveness monitor for a single backend. Runs for the life of the
/// process; a failed probe only ever changes liveness, never stops the loop.
pub struct HealthMonitor {
    backend: Arc<Backend>,
    registry: Arc<BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    tracker: HealthTracker,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<Backend>,
        registry: Arc<BackendRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: &HealthCheckConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            backend,
            registry,
            probe,
            timeout: config.timeout(),
            tracker: HealthTracker::new(config.healthy_threshold, config.unhealthy_threshold),
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let period = self.backend.health_check_interval;
        // The bootstrap sweep has just probed, so the first tick is one period out.
        let mut interval = interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting health monitor for {} with interval: {:?}",
            self.backend.address, period
        );

        loop {
            interval.tick().await;
            self.check().await;
        }
    }

    pub async fn check(&mut self) -> HealthCheckResult {
        let result = probe_backend(self.probe.as_ref(), &self.backend, self.timeout).await;

        let was_alive = self.backend.is_alive();
        let alive = self.tracker.record(result.alive, was_alive);
        let changed = self.registry.set_alive(&self.backend, alive);

        if changed && alive {
            info!(
                "Backend {} is now alive after {} consecutive successes",
                self.backend.address,
                self.tracker.consecutive_successes()
            );
        } else if changed {
            warn!(
                "Backend {} is now dead after {} consecutive failures: {}",
                self.backend.address,
                self.tracker.consecutive_failures(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        } else if let Some(err) = &result.error {
            debug!(
                "Backend {} probe failed after {:?}: {}",
                self.backend.address, result.response_time, err
            );
        } else {
            debug!(
                "Backend {} answered in {:?}",
                self.backend.address, result.response_time
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(
                &self.backend.address,
                result.alive,
                result.response_time,
            );
            metrics.update_backend_health(&self.backend.address, alive);
            if changed {
                metrics.update_backend_counts(self.registry.alive_count(), self.registry.len());
            }
        }

        result
    }
}

/// Starts one monitor task per backend.
pub fn spawn_monitors(
    registry: &Arc<BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: &HealthCheckConfig,
    metrics: Option<Arc<MetricsCollector>>,
) -> Vec<JoinHandle<()>> {
    registry
        .all_backends()
        .iter()
        .map(|backend| {
            HealthMonitor::new(
                backend.clone(),
                registry.clone(),
                probe.clone(),
                config,
                metrics.clone(),
            )
            .spawn()
        })
        .collect()
}

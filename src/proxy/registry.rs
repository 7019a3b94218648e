//
// src/proxy/registry.rs
//

use super::backend::{Backend, BackendMetrics};
use crate::config::{BackendConfig, ConfigError, HealthCheckConfig};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Ordered, fixed set of backends plus a live-only view that is rebuilt on
/// every liveness transition.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    live: ArcSwap<Vec<Arc<Backend>>>,
}

impl BackendRegistry {
    /// Takes ownership of `backends` in order. Each backend's `index` is
    /// reassigned to its position, whatever the caller set.
    pub fn new(backends: Vec<Backend>) -> Self {
        let backends: Vec<Arc<Backend>> = backends
            .into_iter()
            .enumerate()
            .map(|(position, mut backend)| {
                backend.index = position;
                Arc::new(backend)
            })
            .collect();
        let registry = Self {
            backends,
            live: ArcSwap::from_pointee(Vec::new()),
        };
        registry.refresh_live();
        registry
    }

    pub fn from_config(
        configs: &[BackendConfig],
        health: &HealthCheckConfig,
    ) -> Result<Self, ConfigError> {
        let mut backends = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let url = config
                .health_check_url(health)
                .map_err(|e| ConfigError::InvalidHealthEndpoint {
                    address: config.address.clone(),
                    reason: e.to_string(),
                })?;

            backends.push(
                Backend::new(
                    index,
                    config.address.clone(),
                    config.weight,
                    url,
                    config.health_check_interval(health),
                )
                .with_max_connections(config.max_connections),
            );
        }

        Ok(Self::new(backends))
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn get_backend(&self, index: usize) -> Option<Arc<Backend>> {
        self.backends.get(index).cloned()
    }

    /// Snapshot of backends currently marked alive, in registry order.
    pub fn live_backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.live.load_full()
    }

    pub fn alive_count(&self) -> usize {
        self.live.load().len()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn increase_connections(&self, backend: &Backend) {
        if self.owns(backend) {
            backend.increment_connections();
        }
    }

    pub fn decrease_connections(&self, backend: &Backend) {
        if self.owns(backend) {
            backend.decrement_connections();
        }
    }

    /// Writes liveness and reports whether it changed.
    pub fn set_alive(&self, backend: &Backend, alive: bool) -> bool {
        if !self.owns(backend) {
            return false;
        }

        let changed = backend.swap_alive(alive) != alive;
        if changed {
            self.refresh_live();
        }
        changed
    }

    pub fn snapshot(&self) -> Vec<BackendMetrics> {
        self.backends.iter().map(|b| b.get_metrics()).collect()
    }

    fn owns(&self, backend: &Backend) -> bool {
        self.backends
            .get(backend.index)
            .map_or(false, |b| std::ptr::eq(b.as_ref(), backend))
    }

    fn refresh_live(&self) {
        // rcu retries if another transition swapped the view in between, so
        // the last stored view always reflects every flag written before it.
        self.live.rcu(|_| {
            self.backends
                .iter()
                .filter(|b| b.is_alive())
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

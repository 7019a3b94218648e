// src/load_balancer/least_connections.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use std::sync::Arc;

/// Picks the backend with the fewest active connections. Counts are read
/// one at a time, so the result is a best-effort snapshot.
#[derive(Debug, Default)]
pub struct LeastConnectionsBalancer;

impl LeastConnectionsBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnectionsBalancer {
    fn pick_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // min_by_key keeps the first minimum, so ties resolve in registry order
        backends
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}

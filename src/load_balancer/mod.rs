// src/load_balancer/mod.rs
mod algorithm;
mod least_connections;
mod round_robin;
mod weighted_round_robin;

pub use algorithm::LoadBalancer; // trait
pub use least_connections::LeastConnectionsBalancer;
pub use round_robin::RoundRobinBalancer;
pub use weighted_round_robin::SmoothWeightedBalancer;
pub use crate::config::LoadBalancerAlgorithm; // enum exposed if needed

use crate::proxy::{Backend, BackendRegistry};
use std::sync::Arc;

pub fn create_load_balancer(algorithm: LoadBalancerAlgorithm) -> Arc<dyn LoadBalancer> {
    match algorithm {
        LoadBalancerAlgorithm::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        LoadBalancerAlgorithm::WeightedRoundRobin => Arc::new(SmoothWeightedBalancer::new()),
        LoadBalancerAlgorithm::LeastConnections => Arc::new(LeastConnectionsBalancer::new()),
    }
}

/// Runs a strategy over the registry's live-only view, so a backend marked
/// dead is never handed out while a live one exists.
#[derive(Clone)]
pub struct BackendSelector {
    registry: Arc<BackendRegistry>,
    strategy: Arc<dyn LoadBalancer>,
}

impl BackendSelector {
    pub fn new(registry: Arc<BackendRegistry>, strategy: Arc<dyn LoadBalancer>) -> Self {
        Self { registry, strategy }
    }

    /// `None` only when no backend is currently alive.
    pub fn pick(&self) -> Option<Arc<Backend>> {
        let live = self.registry.live_backends();
        self.strategy.pick_server(&live)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }
}

#[cfg(test)]
pub(crate) fn test_backends(weights: &[u32]) -> Vec<Arc<Backend>> {
    weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let addr = format!("127.0.0.1:{}", 5000 + i);
            let url = url::Url::parse(&format!("http://{}/health", addr)).unwrap();
            Arc::new(Backend::new(i, addr, w, url, std::time::Duration::from_secs(1)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_names() {
        assert_eq!(
            create_load_balancer(LoadBalancerAlgorithm::RoundRobin).name(),
            "round_robin"
        );
        assert_eq!(
            create_load_balancer(LoadBalancerAlgorithm::WeightedRoundRobin).name(),
            "weighted_round_robin"
        );
        assert_eq!(
            create_load_balancer(LoadBalancerAlgorithm::LeastConnections).name(),
            "least_connections"
        );
    }
}

// src/load_balancer/weighted_round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use std::sync::{Arc, Mutex, PoisonError};

/// Smooth weighted round robin as done by nginx.
///
/// Every pick adds each candidate's static weight to its current weight,
/// chooses the largest current weight, then takes the sum of the candidate
/// weights back from the winner. The sum of current weights is the same
/// before and after each pick, and heavy backends get interleaved with
/// light ones instead of receiving bursts.
///
/// Current weights belong to the balancer, keyed by registry index, so the
/// backend records stay free of strategy state.
#[derive(Debug, Default)]
pub struct SmoothWeightedBalancer {
    current_weights: Mutex<Vec<i64>>,
}

impl SmoothWeightedBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current weight per registry index.
    pub fn current_weights(&self) -> Vec<i64> {
        self.current_weights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LoadBalancer for SmoothWeightedBalancer {
    fn pick_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // One critical section for the whole scan: `best` is only meaningful
        // against current weights from the same round.
        let mut weights = self
            .current_weights
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut total: i64 = 0;
        let mut best: Option<(&Arc<Backend>, i64)> = None;

        for backend in backends {
            if weights.len() <= backend.index {
                weights.resize(backend.index + 1, 0);
            }

            let weight = i64::from(backend.weight);
            let current = &mut weights[backend.index];
            *current += weight;
            total += weight;

            if best.map_or(true, |(_, w)| *current > w) {
                best = Some((backend, *current));
            }
        }

        let (best, _) = best?;
        weights[best.index] -= total;
        Some(best.clone())
    }

    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_backends;
    use proptest::prelude::*;

    fn longest_run(picks: &[usize], idx: usize) -> usize {
        let mut longest = 0;
        let mut run = 0;
        for &p in picks {
            run = if p == idx { run + 1 } else { 0 };
            longest = longest.max(run);
        }
        longest
    }

    #[test]
    fn test_nginx_sequence() {
        let lb = SmoothWeightedBalancer::new();
        let backends = test_backends(&[1, 5, 1]);

        let picks: Vec<_> = (0..7)
            .map(|_| lb.pick_server(&backends).unwrap().index)
            .collect();
        assert_eq!(picks, vec![1, 1, 0, 1, 2, 1, 1]);
    }

    #[test]
    fn test_registry_indexes_keep_weights_apart() {
        use crate::proxy::BackendRegistry;

        // both records claim index 0, the registry renumbers them
        let backends = [(5000, 1), (5001, 5)]
            .iter()
            .map(|&(port, weight)| {
                let addr = format!("127.0.0.1:{}", port);
                let url = url::Url::parse(&format!("http://{}/health", addr)).unwrap();
                Backend::new(0, addr, weight, url, std::time::Duration::from_secs(1))
            })
            .collect();
        let registry = BackendRegistry::new(backends);

        let lb = SmoothWeightedBalancer::new();
        let mut counts = [0usize; 2];
        for _ in 0..6 {
            counts[lb.pick_server(registry.all_backends()).unwrap().index] += 1;
        }
        assert_eq!(counts, [1, 5]);
        assert_eq!(lb.current_weights().len(), 2);
    }

    #[test]
    fn test_window_proportions() {
        let lb = SmoothWeightedBalancer::new();
        let backends = test_backends(&[1, 5, 1]);

        for _ in 0..10 {
            let mut counts = [0usize; 3];
            for _ in 0..7 {
                counts[lb.pick_server(&backends).unwrap().index] += 1;
            }
            assert_eq!(counts, [1, 5, 1]);
        }
    }

    #[test]
    fn test_no_long_bursts() {
        let lb = SmoothWeightedBalancer::new();
        let weights = [1u32, 5, 1];
        let backends = test_backends(&weights);
        let picks: Vec<_> = (0..70)
            .map(|_| lb.pick_server(&backends).unwrap().index)
            .collect();

        // ceil(weight / total * window) + 1 with window == total
        for (idx, w) in weights.iter().enumerate() {
            assert!(longest_run(&picks, idx) <= *w as usize + 1);
        }
    }

    #[test]
    fn test_empty_returns_none() {
        let lb = SmoothWeightedBalancer::new();
        assert!(lb.pick_server(&[]).is_none());
    }

    #[test]
    fn test_equal_weights_rotate() {
        let lb = SmoothWeightedBalancer::new();
        let backends = test_backends(&[2, 2, 2]);
        let picks: Vec<_> = (0..6)
            .map(|_| lb.pick_server(&backends).unwrap().index)
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    proptest! {
        #[test]
        fn prop_weight_is_conserved(
            weights in prop::collection::vec(1u32..20, 1..8),
            picks in 1usize..100,
        ) {
            let lb = SmoothWeightedBalancer::new();
            let backends = test_backends(&weights);

            for _ in 0..picks {
                let before: i64 = lb.current_weights().iter().sum();
                lb.pick_server(&backends).unwrap();
                let after: i64 = lb.current_weights().iter().sum();
                prop_assert_eq!(before, after);
            }
        }

        #[test]
        fn prop_full_window_matches_weights(
            weights in prop::collection::vec(1u32..10, 1..6),
        ) {
            let lb = SmoothWeightedBalancer::new();
            let backends = test_backends(&weights);
            let window: u32 = weights.iter().sum();

            let mut counts = vec![0u32; weights.len()];
            for _ in 0..window {
                counts[lb.pick_server(&backends).unwrap().index] += 1;
            }
            prop_assert_eq!(counts, weights);
        }
    }
}

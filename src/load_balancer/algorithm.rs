// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use std::sync::Arc;

/// Selection strategy over a set of candidate backends.
///
/// Implementations must be safe to call concurrently and return `None` only
/// when `backends` is empty.
pub trait LoadBalancer: Send + Sync {
    fn pick_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}

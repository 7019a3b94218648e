// src/proxy/backend.rs
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub struct Backend {
    /// Position in the registry, stable for the process lifetime.
    pub index: usize,
    pub address: String,
    pub weight: u32,
    pub max_connections: usize,
    pub health_check_url: Url,
    pub health_check_interval: Duration,

    // Runtime state
    active_connections: AtomicUsize,
    total_connections: AtomicU64,
    failed_connections: AtomicU64,
    bytes_to_backend: AtomicU64,
    bytes_to_client: AtomicU64,
    alive: AtomicBool,
    last_health_check: ArcSwapOption<DateTime<Utc>>,
}

impl Backend {
    pub fn new(
        index: usize,
        address: impl Into<String>,
        weight: u32,
        health_check_url: Url,
        health_check_interval: Duration,
    ) -> Self {
        Self {
            index,
            address: address.into(),
            weight,
            max_connections: 0,
            health_check_url,
            health_check_interval,
            active_connections: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
            failed_connections: AtomicU64::new(0),
            bytes_to_backend: AtomicU64::new(0),
            bytes_to_client: AtomicU64::new(0),
            alive: AtomicBool::new(false),
            last_health_check: ArcSwapOption::empty(),
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Never goes below zero.
    pub fn decrement_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
    }

    pub fn record_failure(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transfer(&self, to_backend: u64, to_client: u64) {
        self.bytes_to_backend.fetch_add(to_backend, Ordering::Relaxed);
        self.bytes_to_client.fetch_add(to_client, Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Returns the previous value.
    pub(crate) fn swap_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::SeqCst)
    }

    pub fn mark_checked(&self) {
        self.last_health_check.store(Some(Arc::new(Utc::now())));
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check.load().as_deref().copied()
    }

    pub fn get_metrics(&self) -> BackendMetrics {
        BackendMetrics {
            address: self.address.clone(),
            weight: self.weight,
            max_connections: self.max_connections,
            alive: self.is_alive(),
            active_connections: self.active_connections(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            bytes_to_backend: self.bytes_to_backend.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            last_health_check: self.last_health_check(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendMetrics {
    pub address: String,
    pub weight: u32,
    pub max_connections: usize,
    pub alive: bool,
    pub active_connections: usize,
    pub total_connections: u64,
    pub failed_connections: u64,
    pub bytes_to_backend: u64,
    pub bytes_to_client: u64,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Backend {
        Backend::new(
            0,
            "127.0.0.1:5000",
            1,
            Url::parse("http://127.0.0.1:5000/health").unwrap(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_new_backend_is_not_alive() {
        let b = backend();
        assert!(!b.is_alive());
        assert_eq!(b.active_connections(), 0);
        assert!(b.last_health_check().is_none());
    }

    #[test]
    fn test_decrement_never_underflows() {
        let b = backend();
        b.decrement_connections();
        assert_eq!(b.active_connections(), 0);

        b.increment_connections();
        b.increment_connections();
        b.decrement_connections();
        assert_eq!(b.active_connections(), 1);
    }

    #[test]
    fn test_concurrent_counter_updates_are_not_lost() {
        let b = Arc::new(backend());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        b.increment_connections();
                    }
                    for _ in 0..500 {
                        b.decrement_connections();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(b.active_connections(), 8 * 500);
        assert_eq!(b.get_metrics().total_connections, 8 * 1000);
    }

    #[test]
    fn test_metrics_snapshot() {
        let b = backend().with_max_connections(10);
        b.swap_alive(true);
        b.mark_checked();
        b.record_transfer(9, 9);
        b.record_failure();

        let m = b.get_metrics();
        assert!(m.alive);
        assert_eq!(m.max_connections, 10);
        assert_eq!(m.bytes_to_backend, 9);
        assert_eq!(m.bytes_to_client, 9);
        assert_eq!(m.failed_connections, 1);
        assert!(m.last_health_check.is_some());
    }
}

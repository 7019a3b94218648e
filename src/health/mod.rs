// src/health/mod.rs
mod checker;
mod probe;
mod status;

pub use checker::{bootstrap_sweep, probe_backend, spawn_monitors, HealthCheckResult, HealthMonitor};
pub use probe::{HealthProbe, HttpProbe, ProbeError};
pub use status::HealthTracker;

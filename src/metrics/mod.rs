// src/metrics/mod.rs
mod collector;

pub use collector::{ConnectionOutcome, MetricsCollector, MetricsRegistry, Timer};

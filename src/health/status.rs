// src/health/status.rs

/// Consecutive-result hysteresis for one backend.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    healthy_threshold: u32,
    unhealthy_threshold: u32,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl HealthTracker {
    pub fn new(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    /// Records a probe result and returns the liveness the backend should have.
    pub fn record(&mut self, success: bool, currently_alive: bool) -> bool {
        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            currently_alive || self.consecutive_successes >= self.healthy_threshold
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            currently_alive && self.consecutive_failures < self.unhealthy_threshold
        }
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

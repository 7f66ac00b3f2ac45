use serde::Serialize;
use std::time::Duration;

/// Cumulative polling counters, owned by one orchestrator instance.
#[derive(Debug, Default)]
pub struct PollMetrics {
    total_cycles: u64,
    success_cycles: u64,
    failure_cycles: u64,
    last_duration_ms: u64,
}

/// Point-in-time view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PollMetricsSnapshot {
    pub total_cycles: u64,
    pub success_cycles: u64,
    pub failure_cycles: u64,
    pub last_duration_ms: u64,
    pub success_ratio: f64,
}

impl PollMetrics {
    pub fn record_success(&mut self, duration: Duration) {
        self.total_cycles += 1;
        self.success_cycles += 1;
        self.last_duration_ms = duration.as_millis() as u64;
    }

    pub fn record_failure(&mut self, duration: Duration) {
        self.total_cycles += 1;
        self.failure_cycles += 1;
        self.last_duration_ms = duration.as_millis() as u64;
    }

    pub fn snapshot(&self) -> PollMetricsSnapshot {
        let success_ratio = if self.total_cycles == 0 {
            0.0
        } else {
            self.success_cycles as f64 / self.total_cycles as f64
        };
        PollMetricsSnapshot {
            total_cycles: self.total_cycles,
            success_cycles: self.success_cycles,
            failure_cycles: self.failure_cycles,
            last_duration_ms: self.last_duration_ms,
            success_ratio,
        }
    }
}

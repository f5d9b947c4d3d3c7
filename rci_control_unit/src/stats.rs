//! O(1) per-step statistics.

use rci_common::error::StepAnomaly;

/// Counters updated at the end of every control step, no allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StepStats {
    /// Total steps invoked (accepted and rejected).
    pub steps: u64,
    /// Steps rejected as a whole (previous outputs held).
    pub rejected: u64,
    /// Steps with at least one DEGRADED flag.
    pub degraded: u64,
    /// Minimum accepted `time_delta` [s].
    pub min_time_delta: f64,
    /// Maximum accepted `time_delta` [s].
    pub max_time_delta: f64,
    /// Running sum of accepted `time_delta` [s].
    pub sum_time_delta: f64,
    /// Last step execution time [ns].
    pub last_exec_ns: u64,
    /// Maximum step execution time [ns].
    pub max_exec_ns: u64,
}

impl StepStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            steps: 0,
            rejected: 0,
            degraded: 0,
            min_time_delta: f64::INFINITY,
            max_time_delta: 0.0,
            sum_time_delta: 0.0,
            last_exec_ns: 0,
            max_exec_ns: 0,
        }
    }

    /// Record one step.
    #[inline]
    pub fn record(&mut self, anomalies: StepAnomaly, time_delta: f64, exec_ns: u64) {
        self.steps += 1;
        self.last_exec_ns = exec_ns;
        if exec_ns > self.max_exec_ns {
            self.max_exec_ns = exec_ns;
        }
        if anomalies.is_degraded() {
            self.degraded += 1;
        }
        if anomalies.is_rejected() {
            self.rejected += 1;
            return;
        }
        if time_delta < self.min_time_delta {
            self.min_time_delta = time_delta;
        }
        if time_delta > self.max_time_delta {
            self.max_time_delta = time_delta;
        }
        self.sum_time_delta += time_delta;
    }

    /// Accepted steps.
    #[inline]
    pub fn accepted(&self) -> u64 {
        self.steps - self.rejected
    }

    /// Average accepted `time_delta` [s] (0 if none).
    #[inline]
    pub fn avg_time_delta(&self) -> f64 {
        let n = self.accepted();
        if n == 0 {
            0.0
        } else {
            self.sum_time_delta / n as f64
        }
    }
}

impl Default for StepStats {
    fn default() -> Self {
        Self::new()
    }
}

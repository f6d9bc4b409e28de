//! Per-executor execution metrics.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutorMetrics {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_secs: f64,
    pub total_memory_mb: f64,
    pub peak_memory_mb: f64,
}

impl ExecutorMetrics {
    pub fn record(&mut self, success: bool, duration: Duration, memory_mb: f64) {
        self.total += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration_secs += duration.as_secs_f64();
        self.total_memory_mb += memory_mb;
        self.peak_memory_mb = self.peak_memory_mb.max(memory_mb);
    }

    #[must_use]
    pub fn avg_duration_secs(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_duration_secs / self.total as f64
        }
    }

    #[must_use]
    pub fn avg_memory_mb(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_memory_mb / self.total as f64
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

//! Executor policies: priority tier, memory and worker bounds, intensity flags.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pressure::PressureLevel;

/// Priority tier. Lower number means more important.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 1,
    High = 2,
    #[default]
    Normal = 3,
    Low = 4,
}

impl Priority {
    #[must_use]
    pub const fn tier(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn timeout_multiplier(self) -> f64 {
        match self {
            Priority::Critical => 1.5,
            Priority::High => 1.2,
            Priority::Normal | Priority::Low => 1.0,
        }
    }

    #[must_use]
    pub fn timeout(self, base: Duration) -> Duration {
        base.mul_f64(self.timeout_multiplier())
    }

    /// Emergency pressure only admits critical and high priority work.
    #[must_use]
    pub const fn admitted_under(self, level: PressureLevel) -> bool {
        !matches!(level, PressureLevel::Emergency)
            || matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorPolicy {
    pub executor_id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_min_memory")]
    pub min_memory_mb: f64,
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: f64,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub memory_intensive: bool,
    #[serde(default)]
    pub cpu_intensive: bool,
}

const fn default_min_memory() -> f64 {
    64.0
}

const fn default_max_memory() -> f64 {
    256.0
}

const fn default_min_workers() -> usize {
    1
}

const fn default_max_workers() -> usize {
    4
}

impl ExecutorPolicy {
    /// Normal priority, 64-256 MB, 1-4 workers.
    #[must_use]
    pub fn default_for(executor_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            priority: Priority::Normal,
            min_memory_mb: default_min_memory(),
            max_memory_mb: default_max_memory(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            memory_intensive: false,
            cpu_intensive: false,
        }
    }

    /// Breaker memory threshold for this executor: 1.5x max memory when
    /// memory intensive, otherwise the global threshold.
    #[must_use]
    pub fn memory_threshold_mb(&self, global: f64) -> f64 {
        if self.memory_intensive {
            self.max_memory_mb * 1.5
        } else {
            global
        }
    }

    /// Workers granted at `level`.
    #[must_use]
    pub fn workers_under(&self, level: PressureLevel) -> usize {
        if level < PressureLevel::Critical {
            return self.max_workers;
        }
        match self.priority {
            Priority::Critical => self.max_workers,
            Priority::High => (self.max_workers / 2).max(self.min_workers),
            Priority::Normal | Priority::Low => self.min_workers,
        }
    }

    /// Memory granted at `level`: the max under mild pressure, the min once
    /// degradation starts disabling expensive work.
    #[must_use]
    pub fn memory_under(&self, level: PressureLevel) -> f64 {
        if level >= PressureLevel::Critical && self.priority != Priority::Critical {
            self.min_memory_mb
        } else {
            self.max_memory_mb
        }
    }
}

//! Resource alerts: threshold checks, repeat suppression and sink fan-out.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pressure::{PressureLevel, ResourceSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Memory,
    Cpu,
    BreakerFailures,
    BreakerOpen,
    BreakerRecovered,
    Degradation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAlert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    /// Executor id, or `"system"` for host-wide alerts.
    pub subject: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub at: DateTime<Utc>,
}

/// Receives every alert that survives suppression.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &ResourceAlert);
}

/// Logs alerts through `tracing` at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn deliver(&self, alert: &ResourceAlert) {
        match alert.severity {
            AlertSeverity::Info => tracing::info!(
                kind = ?alert.kind,
                subject = %alert.subject,
                value = alert.value,
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => tracing::warn!(
                kind = ?alert.kind,
                subject = %alert.subject,
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
            AlertSeverity::Error | AlertSeverity::Critical => tracing::error!(
                severity = %alert.severity,
                kind = ?alert.kind,
                subject = %alert.subject,
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
        }
    }
}

/// Keeps delivered alerts in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<ResourceAlert>>,
}

impl RecordingSink {
    #[must_use]
    pub fn alerts(&self) -> Vec<ResourceAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AlertSink for RecordingSink {
    fn deliver(&self, alert: &ResourceAlert) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub memory_warning_percent: f64,
    pub memory_critical_percent: f64,
    pub cpu_warning_percent: f64,
    pub cpu_critical_percent: f64,
    /// Consecutive failures at which a still-closed breaker raises a warning.
    pub breaker_failure_warning: u32,
    /// Consecutive degraded admissions at which degradation becomes critical.
    pub degradation_critical_count: u32,
    pub suppression_secs: f64,
    pub history_limit: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            memory_warning_percent: 75.0,
            memory_critical_percent: 85.0,
            cpu_warning_percent: 75.0,
            cpu_critical_percent: 85.0,
            breaker_failure_warning: 3,
            degradation_critical_count: 3,
            suppression_secs: 300.0,
            history_limit: 500,
        }
    }
}

#[derive(Default)]
struct AlertState {
    last_emitted: HashMap<(AlertKind, String), Instant>,
    history: VecDeque<ResourceAlert>,
    degraded_streak: u32,
}

pub struct ResourceAlertManager {
    config: AlertConfig,
    sinks: Vec<Arc<dyn AlertSink>>,
    state: Mutex<AlertState>,
}

impl ResourceAlertManager {
    #[must_use]
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
            state: Mutex::new(AlertState::default()),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Most recent alerts, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ResourceAlert> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn check_snapshot(&self, snapshot: &ResourceSnapshot, now: Instant) {
        let c = self.config;
        for (kind, value, warning, critical, label) in [
            (
                AlertKind::Memory,
                snapshot.memory_percent(),
                c.memory_warning_percent,
                c.memory_critical_percent,
                "Memory",
            ),
            (
                AlertKind::Cpu,
                snapshot.cpu_percent(),
                c.cpu_warning_percent,
                c.cpu_critical_percent,
                "CPU",
            ),
        ] {
            let (severity, threshold) = if value >= critical {
                (AlertSeverity::Critical, critical)
            } else if value >= warning {
                (AlertSeverity::Warning, warning)
            } else {
                continue;
            };
            self.raise(
                now,
                severity,
                kind,
                "system",
                format!("{label} usage at {value:.1}%"),
                value,
                threshold,
            );
        }
    }

    /// Called after every recorded failure with the breaker's consecutive count.
    pub fn on_failure(&self, executor_id: &str, failures: u32, opened: bool, now: Instant) {
        if opened {
            self.raise(
                now,
                AlertSeverity::Error,
                AlertKind::BreakerOpen,
                executor_id,
                format!("Circuit breaker opened after {failures} consecutive failures"),
                f64::from(failures),
                f64::from(failures),
            );
        } else if failures >= self.config.breaker_failure_warning {
            self.raise(
                now,
                AlertSeverity::Warning,
                AlertKind::BreakerFailures,
                executor_id,
                format!("{failures} consecutive failures"),
                f64::from(failures),
                f64::from(self.config.breaker_failure_warning),
            );
        }
    }

    pub fn on_recovered(&self, executor_id: &str, now: Instant) {
        self.raise(
            now,
            AlertSeverity::Info,
            AlertKind::BreakerRecovered,
            executor_id,
            "Circuit breaker closed".to_string(),
            0.0,
            0.0,
        );
    }

    /// Called on every admission with the pressure level it ran under.
    pub fn on_admission(&self, level: PressureLevel, now: Instant) {
        let streak = {
            let mut state = self.lock();
            if level == PressureLevel::Normal {
                state.degraded_streak = 0;
                return;
            }
            state.degraded_streak = state.degraded_streak.saturating_add(1);
            state.degraded_streak
        };
        let severity = if streak >= self.config.degradation_critical_count {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        self.raise(
            now,
            severity,
            AlertKind::Degradation,
            "system",
            format!("Degraded execution at {level} pressure ({streak} in a row)"),
            f64::from(streak),
            f64::from(self.config.degradation_critical_count),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn raise(
        &self,
        now: Instant,
        severity: AlertSeverity,
        kind: AlertKind,
        subject: &str,
        message: String,
        value: f64,
        threshold: f64,
    ) {
        let window = Duration::try_from_secs_f64(self.config.suppression_secs).unwrap_or_default();
        let alert = {
            let mut state = self.lock();
            let key = (kind, subject.to_string());
            // critical alerts escalate through the window; everything else repeats once per window
            if severity < AlertSeverity::Critical
                && state
                    .last_emitted
                    .get(&key)
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            {
                return;
            }
            state.last_emitted.insert(key, now);

            let alert = ResourceAlert {
                id: Uuid::new_v4(),
                severity,
                kind,
                subject: subject.to_string(),
                message,
                value,
                threshold,
                at: Utc::now(),
            };
            if state.history.len() >= self.config.history_limit.max(1) {
                state.history.pop_front();
            }
            state.history.push_back(alert.clone());
            alert
        };
        for sink in &self.sinks {
            sink.deliver(&alert);
        }
    }

    fn lock(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

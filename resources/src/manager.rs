//! Adaptive resource manager: per-executor breakers, pressure-driven admission
//! and degradation, execution bookkeeping.
//!
//! All bookkeeping goes through one mutex so concurrent `end_execution` calls
//! never lose an update. Alerts are raised after the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AdmissionError;
use crate::alerts::{ResourceAlert, ResourceAlertManager};
use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker, StateChange};
use crate::degradation::DegradationConfig;
use crate::metrics::ExecutorMetrics;
use crate::policy::{ExecutorPolicy, Priority};
use crate::pressure::{PressureLevel, PressureThresholds, ResourceProbe, ResourceSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub base_timeout_secs: f64,
    pub enable_circuit_breakers: bool,
    pub enable_degradation: bool,
    pub pressure: PressureThresholds,
    pub breaker: BreakerConfig,
    pub policies: Vec<ExecutorPolicy>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_timeout_secs: 300.0,
            enable_circuit_breakers: true,
            enable_degradation: true,
            pressure: PressureThresholds::default(),
            breaker: BreakerConfig::default(),
            policies: Vec::new(),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn base_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.base_timeout_secs).unwrap_or(Duration::from_secs(300))
    }
}

/// Result of the side-effect-free admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed { pressure: PressureLevel },
    Denied(AdmissionError),
}

impl Admission {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Admission::Allowed {
                pressure: PressureLevel::Normal,
            } => "ok".to_string(),
            Admission::Allowed { pressure } => format!("ok, degraded at {pressure} pressure"),
            Admission::Denied(err) => err.to_string(),
        }
    }
}

/// What an admitted execution may use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAllocation {
    pub execution_id: Uuid,
    pub executor_id: String,
    pub priority: Priority,
    pub memory_mb: f64,
    pub workers: usize,
    pub timeout: Duration,
    pub pressure: PressureLevel,
    pub degradation: DegradationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub duration: Duration,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub failure_count: u32,
    pub total_changes: u64,
    pub last_change: Option<StateChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorStatus {
    pub priority: Priority,
    pub active: usize,
    pub metrics: ExecutorMetrics,
    pub avg_duration_secs: f64,
    pub avg_memory_mb: f64,
    pub breaker: Option<BreakerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStatus {
    pub pressure: PressureLevel,
    pub snapshot: ResourceSnapshot,
    pub degradation: DegradationConfig,
    pub executors: BTreeMap<String, ExecutorStatus>,
    pub recent_alerts: Vec<ResourceAlert>,
}

#[derive(Default)]
struct ManagerState {
    policies: HashMap<String, ExecutorPolicy>,
    breakers: HashMap<String, CircuitBreaker>,
    active: HashMap<String, usize>,
    metrics: HashMap<String, ExecutorMetrics>,
}

enum FailureEvent {
    Opened(u32),
    Failed(u32),
    Recovered,
}

pub struct AdaptiveResourceManager {
    config: ManagerConfig,
    probe: Arc<dyn ResourceProbe>,
    alerts: ResourceAlertManager,
    state: Mutex<ManagerState>,
}

impl AdaptiveResourceManager {
    #[must_use]
    pub fn new(
        config: ManagerConfig,
        probe: Arc<dyn ResourceProbe>,
        alerts: ResourceAlertManager,
    ) -> Self {
        let policies = config
            .policies
            .iter()
            .map(|p| (p.executor_id.clone(), p.clone()))
            .collect();
        Self {
            config,
            probe,
            alerts,
            state: Mutex::new(ManagerState {
                policies,
                ..ManagerState::default()
            }),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn register_policy(&self, policy: ExecutorPolicy) {
        tracing::debug!(executor = %policy.executor_id, priority = %policy.priority, "Registered executor policy");
        self.lock().policies.insert(policy.executor_id.clone(), policy);
    }

    #[must_use]
    pub fn policy(&self, executor_id: &str) -> ExecutorPolicy {
        policy_for(&self.lock(), executor_id)
    }

    #[must_use]
    pub fn pressure(&self) -> (PressureLevel, ResourceSnapshot) {
        let snapshot = self.probe.sample();
        (self.config.pressure.level(&snapshot), snapshot)
    }

    /// Pure admission check: reads breaker state and pressure, mutates nothing.
    #[must_use]
    pub fn can_execute(&self, executor_id: &str) -> Admission {
        let (level, _) = self.pressure();
        let state = self.lock();
        match self.admit(&state, executor_id, level, Instant::now()) {
            Ok(()) => Admission::Allowed { pressure: level },
            Err(err) => Admission::Denied(err),
        }
    }

    pub fn start_execution(&self, executor_id: &str) -> Result<ResourceAllocation, AdmissionError> {
        let (level, snapshot) = self.pressure();
        let now = Instant::now();
        let allocation = {
            let mut state = self.lock();
            self.admit(&state, executor_id, level, now)?;

            let policy = policy_for(&state, executor_id);
            if self.config.enable_circuit_breakers {
                self.breaker_mut(&mut state, &policy).on_start(now);
            }
            *state.active.entry(executor_id.to_string()).or_default() += 1;

            let degradation = if self.config.enable_degradation {
                DegradationConfig::for_pressure(level)
            } else {
                DegradationConfig::NONE
            };
            ResourceAllocation {
                execution_id: Uuid::new_v4(),
                executor_id: executor_id.to_string(),
                priority: policy.priority,
                memory_mb: policy.memory_under(level),
                workers: policy.workers_under(level),
                timeout: policy.priority.timeout(self.config.base_timeout()),
                pressure: level,
                degradation,
            }
        };

        if allocation.degradation.is_degraded() {
            tracing::warn!(
                executor = %executor_id,
                pressure = %level,
                entity_limit_factor = allocation.degradation.entity_limit_factor,
                "Admitting with degradation"
            );
        }
        self.alerts.check_snapshot(&snapshot, now);
        self.alerts.on_admission(level, now);
        Ok(allocation)
    }

    /// Records the outcome of an execution started with [`Self::start_execution`].
    pub fn end_execution(&self, executor_id: &str, outcome: ExecutionOutcome) {
        let now = Instant::now();
        let event = {
            let mut state = self.lock();
            if let Some(active) = state.active.get_mut(executor_id) {
                *active = active.saturating_sub(1);
            }

            let policy = policy_for(&state, executor_id);
            let over_memory = {
                let threshold = self.breaker_mut(&mut state, &policy).config().memory_threshold_mb;
                outcome.memory_mb > threshold
            };
            let success = outcome.success && !over_memory;
            state
                .metrics
                .entry(executor_id.to_string())
                .or_default()
                .record(success, outcome.duration, outcome.memory_mb);

            if self.config.enable_circuit_breakers {
                let breaker = self.breaker_mut(&mut state, &policy);
                let before = breaker.state();
                if success {
                    breaker.record_success();
                } else {
                    let reason = if over_memory {
                        format!("memory {:.0} MB over threshold", outcome.memory_mb)
                    } else {
                        "execution failed".to_string()
                    };
                    breaker.record_failure(now, &reason);
                }
                let after = breaker.state();
                let failures = breaker.failure_count();
                if before != after {
                    tracing::info!(
                        executor = %executor_id,
                        from = %before,
                        to = %after,
                        failures,
                        "Circuit breaker transition"
                    );
                }
                match (before, after) {
                    (_, BreakerState::Open) if before != BreakerState::Open => {
                        Some(FailureEvent::Opened(failures))
                    }
                    (_, BreakerState::Closed) if before != BreakerState::Closed => {
                        Some(FailureEvent::Recovered)
                    }
                    _ if !success => Some(FailureEvent::Failed(failures)),
                    _ => None,
                }
            } else {
                None
            }
        };

        match event {
            Some(FailureEvent::Opened(failures)) => {
                self.alerts.on_failure(executor_id, failures, true, now);
            }
            Some(FailureEvent::Failed(failures)) => {
                self.alerts.on_failure(executor_id, failures, false, now);
            }
            Some(FailureEvent::Recovered) => self.alerts.on_recovered(executor_id, now),
            None => {}
        }
    }

    /// Administrative reset. Returns false when the executor has no breaker yet.
    pub fn reset_breaker(&self, executor_id: &str) -> bool {
        let mut state = self.lock();
        let Some(breaker) = state.breakers.get_mut(executor_id) else {
            return false;
        };
        breaker.reset();
        tracing::info!(executor = %executor_id, "Circuit breaker reset");
        true
    }

    #[must_use]
    pub fn breaker_state(&self, executor_id: &str) -> BreakerState {
        self.lock()
            .breakers
            .get(executor_id)
            .map_or(BreakerState::Closed, CircuitBreaker::state)
    }

    #[must_use]
    pub fn status(&self) -> ManagerStatus {
        let (pressure, snapshot) = self.pressure();
        let state = self.lock();
        let mut ids: Vec<&String> = state
            .policies
            .keys()
            .chain(state.breakers.keys())
            .chain(state.metrics.keys())
            .collect();
        ids.sort();
        ids.dedup();

        let executors = ids
            .into_iter()
            .map(|id| {
                let metrics = state.metrics.get(id).cloned().unwrap_or_default();
                let status = ExecutorStatus {
                    priority: policy_for(&state, id).priority,
                    active: state.active.get(id).copied().unwrap_or(0),
                    avg_duration_secs: metrics.avg_duration_secs(),
                    avg_memory_mb: metrics.avg_memory_mb(),
                    metrics,
                    breaker: state.breakers.get(id).map(|b| BreakerStatus {
                        state: b.state(),
                        failure_count: b.failure_count(),
                        total_changes: b.total_changes(),
                        last_change: b.history().last().cloned(),
                    }),
                };
                (id.clone(), status)
            })
            .collect();
        drop(state);

        ManagerStatus {
            pressure,
            snapshot,
            degradation: if self.config.enable_degradation {
                DegradationConfig::for_pressure(pressure)
            } else {
                DegradationConfig::NONE
            },
            executors,
            recent_alerts: self.alerts.history(),
        }
    }

    fn admit(
        &self,
        state: &ManagerState,
        executor_id: &str,
        level: PressureLevel,
        now: Instant,
    ) -> Result<(), AdmissionError> {
        if self.config.enable_circuit_breakers
            && let Some(breaker) = state.breakers.get(executor_id)
            && !breaker.allows(now)
        {
            return Err(AdmissionError::CircuitOpen {
                executor_id: executor_id.to_string(),
                failures: breaker.failure_count(),
                retry_in: breaker.remaining_cooldown(now).unwrap_or_default(),
            });
        }
        let priority = policy_for(state, executor_id).priority;
        if !priority.admitted_under(level) {
            return Err(AdmissionError::Pressure {
                executor_id: executor_id.to_string(),
                level,
                priority,
            });
        }
        Ok(())
    }

    fn breaker_mut<'a>(
        &self,
        state: &'a mut ManagerState,
        policy: &ExecutorPolicy,
    ) -> &'a mut CircuitBreaker {
        state
            .breakers
            .entry(policy.executor_id.clone())
            .or_insert_with(|| {
                CircuitBreaker::new(BreakerConfig {
                    memory_threshold_mb: policy
                        .memory_threshold_mb(self.config.breaker.memory_threshold_mb),
                    ..self.config.breaker
                })
            })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn policy_for(state: &ManagerState, executor_id: &str) -> ExecutorPolicy {
    state
        .policies
        .get(executor_id)
        .cloned()
        .unwrap_or_else(|| ExecutorPolicy::default_for(executor_id))
}

//! Resource management for verity.
//!
//! - **`breaker`**: per-executor circuit breaker with bounded transition history
//! - **`pressure`**: host sampling (`ResourceProbe`) and pressure levels
//! - **`degradation`**: the graduated degradation ladder
//! - **`policy`**: executor priority tiers and resource bounds
//! - **`alerts`**: threshold alerts with suppression and pluggable sinks
//! - **`manager`**: [`AdaptiveResourceManager`], admission and bookkeeping
//! - **`executor`**: [`ResourceAwareExecutor`], deadline + teardown around opaque work
//!
//! The manager never knows what the wrapped work does; it only sees executor
//! ids, outcomes, durations and memory.

pub mod alerts;
pub mod breaker;
pub mod degradation;
pub mod executor;
pub mod manager;
pub mod metrics;
pub mod policy;
pub mod pressure;

use std::time::Duration;

use thiserror::Error;

pub use alerts::{
    AlertConfig, AlertSeverity, AlertSink, RecordingSink, ResourceAlert, ResourceAlertManager,
    TracingSink,
};
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, StateChange};
pub use degradation::DegradationConfig;
pub use executor::{
    ExecutionReport, ExecutionUnit, ResourceAwareExecutor, UnitError, UnitFuture, WorkContext,
};
pub use manager::{
    AdaptiveResourceManager, Admission, ExecutionOutcome, ManagerConfig, ManagerStatus,
    ResourceAllocation,
};
pub use metrics::ExecutorMetrics;
pub use policy::{ExecutorPolicy, Priority};
pub use pressure::{PressureLevel, PressureThresholds, ProcProbe, ResourceProbe, ResourceSnapshot, StaticProbe};

/// Why an execution was not admitted. Expected operational conditions, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionError {
    #[error("circuit open for executor '{executor_id}' after {failures} failures, retry in {retry_in:?}")]
    CircuitOpen {
        executor_id: String,
        failures: u32,
        retry_in: Duration,
    },
    #[error("executor '{executor_id}' ({priority} priority) denied under {level} pressure")]
    Pressure {
        executor_id: String,
        level: PressureLevel,
        priority: Priority,
    },
}

impl AdmissionError {
    #[must_use]
    pub fn executor_id(&self) -> &str {
        match self {
            AdmissionError::CircuitOpen { executor_id, .. }
            | AdmissionError::Pressure { executor_id, .. } => executor_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Denied(#[from] AdmissionError),
    #[error("executor '{executor_id}' exceeded its {timeout:?} deadline")]
    DeadlineExceeded {
        executor_id: String,
        timeout: Duration,
    },
    #[error("executor '{executor_id}' failed: {message}")]
    Failed { executor_id: String, message: String },
    #[error("executor '{executor_id}' panicked: {message}")]
    Panicked { executor_id: String, message: String },
}

impl ExecutionError {
    #[must_use]
    pub fn executor_id(&self) -> &str {
        match self {
            ExecutionError::Denied(err) => err.executor_id(),
            ExecutionError::DeadlineExceeded { executor_id, .. }
            | ExecutionError::Failed { executor_id, .. }
            | ExecutionError::Panicked { executor_id, .. } => executor_id,
        }
    }

    /// Denials happened before admission; nothing was recorded for them.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, ExecutionError::Denied(_))
    }
}

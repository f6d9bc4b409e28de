//! Resource-aware execution of opaque work units.
//!
//! admission → deadline from priority → degrade the size-bounded context →
//! run under the deadline → record the outcome. The outcome is recorded by an
//! [`ExecutionGuard`] so it happens exactly once on every exit path, including
//! the caller dropping the future mid-flight.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::ExecutionError;
use crate::degradation::DegradationConfig;
use crate::manager::{AdaptiveResourceManager, ExecutionOutcome, ResourceAllocation};
use crate::pressure::process_memory_mb;

/// Failure reported by a unit's own logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UnitError(pub String);

impl From<String> for UnitError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for UnitError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

pub type UnitFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, UnitError>> + Send + 'a>>;

/// A piece of work the executor can run. What it does is opaque to verity.
pub trait ExecutionUnit: Send + Sync {
    /// Executor id used for breakers, policies and metrics.
    fn executor_id(&self) -> &str;
    fn execute<'a>(&'a self, ctx: &'a WorkContext) -> UnitFuture<'a>;
}

/// Input handed to a unit: an opaque payload plus the size bounds and switches
/// degradation is allowed to tighten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkContext {
    pub payload: Value,
    pub max_entities: usize,
    pub max_chunks: usize,
    pub max_results: usize,
    pub embedding_dims: usize,
    #[serde(default)]
    pub skip_optional_analysis: bool,
    #[serde(default)]
    pub use_simplified_methods: bool,
    #[serde(default)]
    pub disable_expensive_computations: bool,
    /// Per-component seeds for stochastic work, keyed by component name.
    #[serde(default)]
    pub seeds: BTreeMap<String, u32>,
}

impl WorkContext {
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            max_entities: 1000,
            max_chunks: 100,
            max_results: 50,
            embedding_dims: 768,
            skip_optional_analysis: false,
            use_simplified_methods: false,
            disable_expensive_computations: false,
            seeds: BTreeMap::new(),
        }
    }

    /// Copy with `degradation` applied. Bounds never drop below 1.
    #[must_use]
    pub fn degraded(&self, degradation: &DegradationConfig) -> Self {
        Self {
            payload: self.payload.clone(),
            max_entities: degradation.scale_limit(self.max_entities),
            max_chunks: degradation.scale_limit(self.max_chunks),
            max_results: degradation.scale_limit(self.max_results),
            embedding_dims: if degradation.reduce_embedding_dims {
                (self.embedding_dims / 2).max(1)
            } else {
                self.embedding_dims
            },
            skip_optional_analysis: self.skip_optional_analysis
                || degradation.skip_optional_analysis,
            use_simplified_methods: self.use_simplified_methods
                || degradation.use_simplified_methods,
            disable_expensive_computations: self.disable_expensive_computations
                || degradation.disable_expensive_computations,
            seeds: self.seeds.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub allocation: ResourceAllocation,
    /// Context as the unit actually saw it.
    pub context: WorkContext,
    pub output: Value,
    pub duration: Duration,
    pub memory_mb: f64,
}

/// Ends the execution on drop unless [`ExecutionGuard::finish`] already did.
struct ExecutionGuard<'a> {
    manager: &'a AdaptiveResourceManager,
    executor_id: String,
    started: Instant,
    baseline_mb: Option<f64>,
    finished: bool,
}

impl<'a> ExecutionGuard<'a> {
    fn new(manager: &'a AdaptiveResourceManager, executor_id: &str) -> Self {
        Self {
            manager,
            executor_id: executor_id.to_string(),
            started: Instant::now(),
            baseline_mb: process_memory_mb(),
            finished: false,
        }
    }

    fn outcome(&self, success: bool) -> ExecutionOutcome {
        let memory_mb = match (self.baseline_mb, process_memory_mb()) {
            (Some(before), Some(after)) => (after - before).max(0.0),
            _ => 0.0,
        };
        ExecutionOutcome {
            success,
            duration: self.started.elapsed(),
            memory_mb,
        }
    }

    fn finish(mut self, success: bool) -> ExecutionOutcome {
        let outcome = self.outcome(success);
        self.finished = true;
        self.manager.end_execution(&self.executor_id, outcome);
        outcome
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!(executor = %self.executor_id, "Execution dropped before completion, recording failure");
        let outcome = self.outcome(false);
        self.manager.end_execution(&self.executor_id, outcome);
    }
}

pub struct ResourceAwareExecutor {
    manager: Arc<AdaptiveResourceManager>,
}

impl ResourceAwareExecutor {
    #[must_use]
    pub fn new(manager: Arc<AdaptiveResourceManager>) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn manager(&self) -> &AdaptiveResourceManager {
        &self.manager
    }

    pub async fn execute(
        &self,
        unit: &dyn ExecutionUnit,
        ctx: &WorkContext,
    ) -> Result<ExecutionReport, ExecutionError> {
        let executor_id = unit.executor_id();
        let allocation = self.manager.start_execution(executor_id)?;
        let guard = ExecutionGuard::new(&self.manager, executor_id);
        let context = ctx.degraded(&allocation.degradation);

        // Building the future runs unit code too, so it happens inside the catch.
        let run = AssertUnwindSafe(async { unit.execute(&context).await }).catch_unwind();
        let result = timeout(allocation.timeout, run).await;

        match result {
            Err(_) => {
                guard.finish(false);
                tracing::warn!(executor = %executor_id, timeout = ?allocation.timeout, "Execution deadline exceeded");
                Err(ExecutionError::DeadlineExceeded {
                    executor_id: executor_id.to_string(),
                    timeout: allocation.timeout,
                })
            }
            Ok(Err(payload)) => {
                guard.finish(false);
                let message = panic_payload_to_string(&*payload);
                tracing::error!(executor = %executor_id, %message, "Execution unit panicked");
                Err(ExecutionError::Panicked {
                    executor_id: executor_id.to_string(),
                    message,
                })
            }
            Ok(Ok(Err(err))) => {
                guard.finish(false);
                tracing::warn!(executor = %executor_id, error = %err, "Execution unit failed");
                Err(ExecutionError::Failed {
                    executor_id: executor_id.to_string(),
                    message: err.0,
                })
            }
            Ok(Ok(Ok(output))) => {
                let outcome = guard.finish(true);
                Ok(ExecutionReport {
                    allocation,
                    context,
                    output,
                    duration: outcome.duration,
                    memory_mb: outcome.memory_mb,
                })
            }
        }
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

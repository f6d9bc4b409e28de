//! Layer evaluation and Choquet aggregation for verity.
//!
//! [`CalibrationOrchestrator::calibrate`] is the only entry point collaborators
//! need: it resolves the method's role, runs every required layer evaluator,
//! fuses the layer scores and caches the result under the config hash.

pub mod aggregator;
pub mod inputs;
pub mod layers;
mod orchestrator;

use thiserror::Error;
use verity_types::{LayerScoreError, MethodRole};

pub use aggregator::{
    Aggregation, BoundsViolation, ChoquetAggregator, InteractionContribution, LinearContribution,
};
pub use inputs::{EnsembleObservation, GovernanceEvidence, LayerInputs, UnitObservation};
pub use orchestrator::{
    CacheStats, CalibrationMode, CalibrationOrchestrator, CalibrationResult, ResultSource,
};

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no calibration registered for method '{method_id}' and no flagged default entry")]
    MissingCalibration { method_id: String },
    #[error("method '{method_id}' resolved to role {role}, which has no role config")]
    MissingRoleConfig { method_id: String, role: MethodRole },
    #[error("method '{method_id}': {source}")]
    Bounds {
        method_id: String,
        #[source]
        source: BoundsViolation,
    },
    #[error("method '{method_id}': {source}")]
    LayerScore {
        method_id: String,
        #[source]
        source: LayerScoreError,
    },
}

impl CalibrationError {
    /// Out-of-range scores are defects; the process should stop calibrating.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            CalibrationError::Bounds { .. } | CalibrationError::LayerScore { .. }
        )
    }

    #[must_use]
    pub fn method_id(&self) -> &str {
        match self {
            CalibrationError::MissingCalibration { method_id }
            | CalibrationError::MissingRoleConfig { method_id, .. }
            | CalibrationError::Bounds { method_id, .. }
            | CalibrationError::LayerScore { method_id, .. } => method_id,
        }
    }
}

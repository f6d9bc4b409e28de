//! Core domain types for verity.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the engine: the config loader,
//! the layer evaluators, the resource manager and the ledger all speak this vocabulary.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod layer;
mod method;
mod role;
mod subject;

pub use layer::{
    BaseComponents, ChainComponents, CongruenceComponents, ContextualComponents, CostSample,
    LayerComponents, LayerId, LayerScore, LayerScoreError, MetaComponents, UnitComponents,
    UnknownLayerError,
};
pub use method::{
    FusionRequirement, InputParameter, MethodRegistry, MethodSignature, RangeError, ValueRange,
};
pub use role::{MethodRole, UnknownRoleError};
pub use subject::{CalibrationContext, CalibrationSubject, EnsemblePosition, PositionError};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Score
// ============================================================================

/// A finite value in the closed unit interval.
///
/// Every layer score, sub-component and calibration result is a `Score`, so a value
/// outside `[0, 1]` can only exist as a raw `f64` that failed construction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ScoreError {
    #[error("score {value} is outside [0, 1]")]
    OutOfRange { value: f64 },
    #[error("score is not a finite number")]
    NotFinite,
}

impl Score {
    pub const ZERO: Score = Score(0.0);
    pub const ONE: Score = Score(1.0);

    pub fn new(value: f64) -> Result<Self, ScoreError> {
        if !value.is_finite() {
            return Err(ScoreError::NotFinite);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ScoreError::OutOfRange { value });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// The weaker of two scores. Interaction terms are built from this.
    #[must_use]
    pub fn min(self, other: Score) -> Score {
        if other.0 < self.0 { other } else { self }
    }
}

impl TryFrom<f64> for Score {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for f64 {
    fn from(value: Score) -> Self {
        value.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Neumaier-compensated sum.
///
/// Weight totals and Choquet sums go through this so that weights written as
/// short decimals (`0.2 + 0.15 + ...`) add up to exactly `1.0` when their exact
/// binary values round there, and the result does not depend on accumulated error.
#[must_use]
pub fn compensated_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for value in values {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

//! Method signatures as published by the method registry collaborator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RangeError {
    #[error("range bound is not a finite number")]
    NotFinite,
    #[error("range lower bound {min} exceeds upper bound {max}")]
    Inverted { min: f64, max: f64 },
}

/// Closed numeric interval a method declares for its output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct ValueRange {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct RawRange {
    min: f64,
    max: f64,
}

impl TryFrom<RawRange> for ValueRange {
    type Error = RangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        ValueRange::new(raw.min, raw.max)
    }
}

impl ValueRange {
    pub const UNIT: ValueRange = ValueRange { min: 0.0, max: 1.0 };

    pub fn new(min: f64, max: f64) -> Result<Self, RangeError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(RangeError::NotFinite);
        }
        if min > max {
            return Err(RangeError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub const fn min(self) -> f64 {
        self.min
    }

    #[must_use]
    pub const fn max(self) -> f64 {
        self.max
    }

    /// True when the whole range sits inside `[0, 1]`.
    #[must_use]
    pub fn within_unit(self) -> bool {
        self.min >= 0.0 && self.max <= 1.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    pub name: String,
    pub required: bool,
}

/// The fusion strategy a method declares and the ensemble inputs it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionRequirement {
    pub strategy: String,
    pub requires: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub method_id: String,
    pub parameters: Vec<InputParameter>,
    pub fusion: Option<FusionRequirement>,
}

impl MethodSignature {
    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    pub fn optional_inputs(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| !p.required)
            .map(|p| p.name.as_str())
    }

    /// Every declared input name, required or optional.
    #[must_use]
    pub fn declared_inputs(&self) -> BTreeSet<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Lookup of method signatures by id.
///
/// Implemented by the file-backed catalog in `verity-config` and by embedding
/// applications that already own a method inventory.
pub trait MethodRegistry: Send + Sync {
    fn signature(&self, method_id: &str) -> Option<&MethodSignature>;
}

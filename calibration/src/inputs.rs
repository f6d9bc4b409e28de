//! Observations collaborators hand in alongside a subject.
//!
//! Every field is optional. A layer whose observation is absent is not guessed:
//! it is reported missing and the aggregator scores it 0.0.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use verity_types::{CostSample, MethodRole, Score, ValueRange};
use verity_utils::sha256_hex;

/// Quality of the structured data the method consumed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitObservation {
    pub coverage: Score,
    pub structural_completeness: Score,
}

/// What the rest of the ensemble makes available to this method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleObservation {
    pub available_inputs: BTreeSet<String>,
    pub output_range: ValueRange,
}

/// Transparency, governance and runtime facts for the meta layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceEvidence {
    pub formula_documented: bool,
    pub full_trace: bool,
    pub logs_conform: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_tag: Option<String>,
    /// Config hash the method ran under; compared against the loaded set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub signature_valid: bool,
    pub runtime: CostSample,
}

impl Default for GovernanceEvidence {
    fn default() -> Self {
        Self {
            formula_documented: false,
            full_trace: false,
            logs_conform: false,
            version_tag: None,
            config_hash: None,
            signature_valid: false,
            runtime: CostSample::Unmeasured,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitObservation>,
    /// Input names actually supplied by upstream methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<EnsembleObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceEvidence>,
    /// Role declared by the caller. Only consulted in lenient mode, for methods
    /// with no registry entry and no flagged default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_hint: Option<MethodRole>,
}

impl LayerInputs {
    /// SHA-256 of the canonical JSON encoding, part of the cache key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        sha256_hex(serde_json::to_vec(self).unwrap_or_default())
    }
}

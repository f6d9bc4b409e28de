//! Structured config violations.
//!
//! Loading never stops at the first problem: every file is checked and all
//! violations are returned together so an operator can fix them in one pass.

use thiserror::Error;
use verity_types::{LayerId, MethodRole};

use crate::descriptor::DescriptorError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("{file}: unknown layer '{key}'")]
    UnknownLayer { file: &'static str, key: String },
    #[error("{file}: unknown role '{key}'")]
    UnknownRole { file: &'static str, key: String },
    #[error("role {role}: weight for {term} is {weight}, weights must be finite and >= 0")]
    NegativeWeight {
        role: MethodRole,
        term: String,
        weight: f64,
    },
    #[error(
        "role {role}: linear {linear} + interaction {interaction} = {total}, expected 1.0 (tolerance 1e-9)"
    )]
    UnbalancedWeights {
        role: MethodRole,
        linear: f64,
        interaction: f64,
        total: f64,
    },
    #[error("role {role}: interaction must name exactly two layers, got {count}")]
    MalformedInteraction { role: MethodRole, count: usize },
    #[error("role {role}: interaction pairs {layer} with itself")]
    SelfInteraction { role: MethodRole, layer: LayerId },
    #[error("role {role}: interaction {pair} declared more than once")]
    DuplicateInteraction { role: MethodRole, pair: String },
    #[error("role {role}: weight on layer {layer} which the role does not require")]
    WeightOnUnrequiredLayer { role: MethodRole, layer: LayerId },
    #[error("role {role}: required layers omit canonical layer {layer}")]
    MissingCanonicalLayer { role: MethodRole, layer: LayerId },
    #[error("method {method_id}: role {role} has no weight configuration")]
    MissingRoleConfig { method_id: String, role: MethodRole },
    #[error("base weights theory {theory} + implementation {implementation} + deployment {deployment} must be >= 0 and sum to 1.0")]
    BaseWeights {
        theory: f64,
        implementation: f64,
        deployment: f64,
    },
    #[error("method {method_id}: {field} = {value} is outside [0, 1]")]
    ScoreOutOfRange {
        method_id: String,
        field: String,
        value: f64,
    },
    #[error("methods {methods:?} are all flagged is_default; at most one default entry is allowed")]
    MultipleDefaults { methods: Vec<String> },
    #[error(
        "method {method_id}: sub-scores equal flagged default '{default_id}' but the entry is not flagged is_default"
    )]
    ImplicitDefault {
        method_id: String,
        default_id: String,
    },
    #[error("undeclared compatibility default {value} must be below 1.0")]
    UndeclaredDefaultTooHigh { value: f64 },
    #[error(
        "method {method_id}: claims universal compatibility (min question {min_question}, min dimension {min_dimension}, min policy area {min_policy_area} all >= 0.99)"
    )]
    UniversalCompatibility {
        method_id: String,
        min_question: f64,
        min_dimension: f64,
        min_policy_area: f64,
    },
    #[error("meta weights transparency {transparency} + governance {governance} + cost {cost} must be >= 0 and sum to 1.0")]
    MetaWeights {
        transparency: f64,
        governance: f64,
        cost: f64,
    },
    #[error("meta {name} steps {steps:?} must be four non-decreasing values in [0, 1]")]
    MetaSteps { name: &'static str, steps: Vec<f64> },
    #[error("meta cost thresholds must satisfy 0 < fast ({fast_secs}) <= acceptable ({acceptable_secs})")]
    CostThresholds { fast_secs: f64, acceptable_secs: f64 },
    #[error("{file}: {key}: {error}")]
    Descriptor {
        file: &'static str,
        key: String,
        error: DescriptorError,
    },
    #[error("method {method_id}: input '{input}' is declared both required and optional")]
    OverlappingInputs { method_id: String, input: String },
    #[error("method {method_id}: fusion_requires given without a fusion strategy")]
    FusionWithoutStrategy { method_id: String },
}

/// Accumulates violations while a config set is being built.
#[derive(Debug, Default)]
pub(crate) struct Violations(Vec<Violation>);

impl Violations {
    pub(crate) fn push(&mut self, violation: Violation) {
        tracing::warn!(%violation, "Calibration config violation");
        self.0.push(violation);
    }

    pub(crate) fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        for violation in violations {
            self.push(violation);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_vec(self) -> Vec<Violation> {
        self.0
    }
}

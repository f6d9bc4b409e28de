//! Calibration registry (`intrinsic.toml`): which methods are calibrated, under
//! which role, and their theory / implementation / deployment sub-scores.
//!
//! A registry may carry one entry flagged `is_default = true`. That entry is the
//! only way an uncalibrated method ever receives scores, and lookups through it are
//! reported with [`EntrySource::FlaggedDefault`] so callers can tell the difference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use verity_types::{MethodRole, Score, ValueRange, compensated_sum};

use crate::descriptor::Descriptor;
use crate::roles::WEIGHT_SUM_TOLERANCE;
use crate::violation::{Violation, Violations};

pub(crate) const FILE: &str = "intrinsic.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IntrinsicFile {
    #[serde(default)]
    base_weights: BaseWeights,
    #[serde(default)]
    methods: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    role: String,
    theory: f64,
    implementation: f64,
    deployment: f64,
    #[serde(default)]
    output_range: Option<String>,
    #[serde(default)]
    is_default: bool,
}

/// Weights of the base layer's three sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseWeights {
    pub theory: f64,
    pub implementation: f64,
    pub deployment: f64,
}

impl Default for BaseWeights {
    fn default() -> Self {
        Self {
            theory: 0.4,
            implementation: 0.35,
            deployment: 0.25,
        }
    }
}

impl BaseWeights {
    fn is_valid(self) -> bool {
        let parts = [self.theory, self.implementation, self.deployment];
        parts.iter().all(|w| w.is_finite() && *w >= 0.0)
            && (compensated_sum(parts) - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationEntry {
    pub method_id: String,
    pub role: MethodRole,
    pub theory: Score,
    pub implementation: Score,
    pub deployment: Score,
    pub output_range: ValueRange,
    pub is_default: bool,
}

impl CalibrationEntry {
    fn same_scores(&self, other: &CalibrationEntry) -> bool {
        self.theory == other.theory
            && self.implementation == other.implementation
            && self.deployment == other.deployment
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EntrySource {
    /// The method has its own entry.
    Registered,
    /// No entry; the flagged default entry stands in.
    FlaggedDefault { default_id: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntry<'a> {
    entry: &'a CalibrationEntry,
    from_default: bool,
}

impl<'a> ResolvedEntry<'a> {
    #[must_use]
    pub const fn entry(self) -> &'a CalibrationEntry {
        self.entry
    }

    #[must_use]
    pub fn source(self) -> EntrySource {
        if self.from_default {
            EntrySource::FlaggedDefault {
                default_id: self.entry.method_id.clone(),
            }
        } else {
            EntrySource::Registered
        }
    }

    #[must_use]
    pub const fn is_default(self) -> bool {
        self.from_default
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationRegistry {
    base_weights: BaseWeights,
    entries: BTreeMap<String, CalibrationEntry>,
    default_id: Option<String>,
}

impl CalibrationRegistry {
    #[must_use]
    pub const fn base_weights(&self) -> BaseWeights {
        self.base_weights
    }

    /// Exact lookup. Never falls back to the default entry.
    #[must_use]
    pub fn get(&self, method_id: &str) -> Option<&CalibrationEntry> {
        self.entries.get(method_id)
    }

    /// Lookup falling back to the flagged default entry, if one exists.
    #[must_use]
    pub fn resolve(&self, method_id: &str) -> Option<ResolvedEntry<'_>> {
        if let Some(entry) = self.entries.get(method_id) {
            return Some(ResolvedEntry {
                entry,
                from_default: false,
            });
        }
        self.flagged_default().map(|entry| ResolvedEntry {
            entry,
            from_default: true,
        })
    }

    #[must_use]
    pub fn flagged_default(&self) -> Option<&CalibrationEntry> {
        self.default_id
            .as_deref()
            .and_then(|id| self.entries.get(id))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CalibrationEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unflagged entries carrying exactly the flagged default's sub-scores.
    ///
    /// Such an entry behaves like a default without saying so, which would make
    /// default-sourced scores indistinguishable from calibrated ones.
    #[must_use]
    pub fn implicit_defaults(&self) -> Vec<&CalibrationEntry> {
        let Some(default) = self.flagged_default() else {
            return Vec::new();
        };
        self.entries
            .values()
            .filter(|entry| !entry.is_default && entry.same_scores(default))
            .collect()
    }
}

pub(crate) fn build_registry(file: IntrinsicFile, violations: &mut Violations) -> CalibrationRegistry {
    let base_weights = file.base_weights;
    if !base_weights.is_valid() {
        violations.push(Violation::BaseWeights {
            theory: base_weights.theory,
            implementation: base_weights.implementation,
            deployment: base_weights.deployment,
        });
    }

    let mut entries = BTreeMap::new();
    for (method_id, raw) in file.methods {
        let Ok(role) = raw.role.parse::<MethodRole>() else {
            violations.push(Violation::UnknownRole {
                file: FILE,
                key: format!("{method_id}.role = {}", raw.role),
            });
            continue;
        };

        let mut score = |field: &str, value: f64| match Score::new(value) {
            Ok(score) => Some(score),
            Err(_) => {
                violations.push(Violation::ScoreOutOfRange {
                    method_id: method_id.clone(),
                    field: field.to_string(),
                    value,
                });
                None
            }
        };
        let theory = score("theory", raw.theory);
        let implementation = score("implementation", raw.implementation);
        let deployment = score("deployment", raw.deployment);

        let output_range = match raw.output_range.as_deref() {
            None => Some(ValueRange::UNIT),
            Some(text) => parse_output_range(&method_id, text, violations),
        };

        if let (Some(theory), Some(implementation), Some(deployment), Some(output_range)) =
            (theory, implementation, deployment, output_range)
        {
            entries.insert(
                method_id.clone(),
                CalibrationEntry {
                    method_id,
                    role,
                    theory,
                    implementation,
                    deployment,
                    output_range,
                    is_default: raw.is_default,
                },
            );
        }
    }

    let defaults: Vec<String> = entries
        .values()
        .filter(|e| e.is_default)
        .map(|e| e.method_id.clone())
        .collect();
    if defaults.len() > 1 {
        violations.push(Violation::MultipleDefaults {
            methods: defaults.clone(),
        });
    }

    let registry = CalibrationRegistry {
        base_weights,
        entries,
        default_id: defaults.into_iter().next(),
    };
    if let Some(default) = registry.flagged_default() {
        for entry in registry.implicit_defaults() {
            violations.push(Violation::ImplicitDefault {
                method_id: entry.method_id.clone(),
                default_id: default.method_id.clone(),
            });
        }
    }
    registry
}

fn parse_output_range(
    method_id: &str,
    text: &str,
    violations: &mut Violations,
) -> Option<ValueRange> {
    let key = format!("{method_id}.output_range");
    match Descriptor::parse_range(text) {
        Ok(range) => match range.to_value_range() {
            Ok(range) => Some(range),
            Err(_) => {
                violations.push(Violation::ScoreOutOfRange {
                    method_id: method_id.to_string(),
                    field: "output_range".to_string(),
                    value: range.lower.value(),
                });
                None
            }
        },
        Err(error) => {
            violations.push(Violation::Descriptor {
                file: FILE,
                key,
                error,
            });
            None
        }
    }
}

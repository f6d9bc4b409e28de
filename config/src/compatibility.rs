//! Method compatibility with questions, dimensions and policy areas
//! (`compatibility.toml`).
//!
//! Undeclared pairs resolve to the table's `undeclared` value, which is always
//! strictly below 1.0: a method only gets full marks where it says so explicitly.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use verity_types::{LayerId, Score};

use crate::violation::{Violation, Violations};

pub(crate) const FILE: &str = "compatibility.toml";

/// Compatibility used for an undeclared (method, target) pair unless configured.
pub const DEFAULT_UNDECLARED: f64 = 0.1;

/// A method at or above this on every target of every axis claims universality.
pub const UNIVERSAL_THRESHOLD: f64 = 0.99;

const fn default_undeclared() -> f64 {
    DEFAULT_UNDECLARED
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CompatibilityFile {
    #[serde(default = "default_undeclared")]
    undeclared: f64,
    #[serde(default)]
    universe: Option<RawUniverse>,
    #[serde(default)]
    methods: BTreeMap<String, RawMethod>,
}

impl Default for CompatibilityFile {
    fn default() -> Self {
        Self {
            undeclared: DEFAULT_UNDECLARED,
            universe: None,
            methods: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUniverse {
    #[serde(default)]
    questions: BTreeSet<String>,
    #[serde(default)]
    dimensions: BTreeSet<String>,
    #[serde(default)]
    policy_areas: BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMethod {
    #[serde(default)]
    questions: BTreeMap<String, f64>,
    #[serde(default)]
    dimensions: BTreeMap<String, f64>,
    #[serde(default)]
    policy_areas: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCompatibility {
    pub questions: BTreeMap<String, Score>,
    pub dimensions: BTreeMap<String, Score>,
    pub policy_areas: BTreeMap<String, Score>,
}

impl MethodCompatibility {
    fn axis(&self, layer: LayerId) -> Option<&BTreeMap<String, Score>> {
        match layer {
            LayerId::Question => Some(&self.questions),
            LayerId::Dimension => Some(&self.dimensions),
            LayerId::Policy => Some(&self.policy_areas),
            _ => None,
        }
    }
}

/// Resolved compatibility for one (method, target) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compatibility {
    pub value: Score,
    pub declared: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompatibilityTable {
    undeclared: Score,
    universe: Option<[BTreeSet<String>; 3]>,
    methods: BTreeMap<String, MethodCompatibility>,
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self {
            undeclared: Score::new(DEFAULT_UNDECLARED).unwrap_or(Score::ZERO),
            universe: None,
            methods: BTreeMap::new(),
        }
    }
}

impl CompatibilityTable {
    #[must_use]
    pub const fn undeclared(&self) -> Score {
        self.undeclared
    }

    #[must_use]
    pub fn method(&self, method_id: &str) -> Option<&MethodCompatibility> {
        self.methods.get(method_id)
    }

    /// Compatibility of `method_id` with `target` on a contextual layer.
    #[must_use]
    pub fn lookup(&self, method_id: &str, layer: LayerId, target: &str) -> Compatibility {
        let declared = self
            .methods
            .get(method_id)
            .and_then(|m| m.axis(layer))
            .and_then(|axis| axis.get(target))
            .copied();
        match declared {
            Some(value) => Compatibility {
                value,
                declared: true,
            },
            None => Compatibility {
                value: self.undeclared,
                declared: false,
            },
        }
    }

    /// Ids of every known target on one axis.
    ///
    /// Uses the explicit `[universe]` when configured, otherwise every id any
    /// method mentions on that axis.
    fn known_targets(&self, layer: LayerId) -> BTreeSet<&str> {
        let index = match layer {
            LayerId::Question => 0,
            LayerId::Dimension => 1,
            LayerId::Policy => 2,
            _ => return BTreeSet::new(),
        };
        if let Some(universe) = &self.universe {
            return universe[index].iter().map(String::as_str).collect();
        }
        self.methods
            .values()
            .filter_map(|m| m.axis(layer))
            .flat_map(|axis| axis.keys().map(String::as_str))
            .collect()
    }

    /// Lowest compatibility `method_id` has across every known target of `layer`.
    /// An axis with no known targets yields the undeclared default.
    fn floor(&self, method_id: &str, layer: LayerId) -> f64 {
        self.known_targets(layer)
            .into_iter()
            .map(|target| self.lookup(method_id, layer, target).value.get())
            .reduce(f64::min)
            .unwrap_or(self.undeclared.get())
    }

    /// Methods claiming compatibility >= [`UNIVERSAL_THRESHOLD`] with every
    /// question, dimension and policy area at once.
    #[must_use]
    pub fn universal_claims(&self) -> Vec<Violation> {
        self.methods
            .keys()
            .filter_map(|method_id| {
                let min_question = self.floor(method_id, LayerId::Question);
                let min_dimension = self.floor(method_id, LayerId::Dimension);
                let min_policy_area = self.floor(method_id, LayerId::Policy);
                (min_question >= UNIVERSAL_THRESHOLD
                    && min_dimension >= UNIVERSAL_THRESHOLD
                    && min_policy_area >= UNIVERSAL_THRESHOLD)
                    .then(|| Violation::UniversalCompatibility {
                        method_id: method_id.clone(),
                        min_question,
                        min_dimension,
                        min_policy_area,
                    })
            })
            .collect()
    }
}

pub(crate) fn build_compatibility(
    file: CompatibilityFile,
    violations: &mut Violations,
) -> CompatibilityTable {
    let undeclared = match Score::new(file.undeclared) {
        Ok(score) if score.get() < 1.0 => score,
        _ => {
            violations.push(Violation::UndeclaredDefaultTooHigh {
                value: file.undeclared,
            });
            Score::new(DEFAULT_UNDECLARED).unwrap_or(Score::ZERO)
        }
    };

    let mut methods = BTreeMap::new();
    for (method_id, raw) in file.methods {
        let mut axis = |name: &str, raw: BTreeMap<String, f64>| {
            let mut out = BTreeMap::new();
            for (target, value) in raw {
                match Score::new(value) {
                    Ok(score) => {
                        out.insert(target, score);
                    }
                    Err(_) => violations.push(Violation::ScoreOutOfRange {
                        method_id: method_id.clone(),
                        field: format!("{name}.{target}"),
                        value,
                    }),
                }
            }
            out
        };
        let compat = MethodCompatibility {
            questions: axis("questions", raw.questions),
            dimensions: axis("dimensions", raw.dimensions),
            policy_areas: axis("policy_areas", raw.policy_areas),
        };
        methods.insert(method_id, compat);
    }

    let table = CompatibilityTable {
        undeclared,
        universe: file
            .universe
            .map(|u| [u.questions, u.dimensions, u.policy_areas]),
        methods,
    };
    violations.extend(table.universal_claims());
    table
}

//! Per-role Choquet weights (`roles.toml`).
//!
//! ```toml
//! [roles.score_question]
//! required_layers = ["@b", "@u", "@q", "@d", "@p", "@C", "@chain", "@m"]
//!
//! [roles.score_question.linear]
//! "@b" = 0.17
//!
//! [[roles.score_question.interactions]]
//! layers = ["@u", "@chain"]
//! weight = 0.05
//! rationale = "plan quality only matters with a sound chain"
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use verity_types::{LayerId, MethodRole, compensated_sum};

use crate::violation::{Violation, Violations};

/// Allowed distance between the total weight and 1.0. The aggregator snaps
/// results that overshoot `[0, 1]` by no more than this back onto the bound.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

pub(crate) const FILE: &str = "roles.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RolesFile {
    #[serde(default)]
    roles: BTreeMap<String, RawRole>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRole {
    #[serde(default)]
    required_layers: Option<Vec<String>>,
    #[serde(default)]
    linear: BTreeMap<String, f64>,
    #[serde(default)]
    interactions: Vec<RawInteraction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInteraction {
    layers: Vec<String>,
    weight: f64,
    #[serde(default)]
    rationale: String,
}

/// Unordered pair of distinct layers, stored low-to-high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LayerPair {
    first: LayerId,
    second: LayerId,
}

impl LayerPair {
    /// `None` when both sides name the same layer.
    #[must_use]
    pub fn new(a: LayerId, b: LayerId) -> Option<Self> {
        match a.cmp(&b) {
            Ordering::Less => Some(Self {
                first: a,
                second: b,
            }),
            Ordering::Greater => Some(Self {
                first: b,
                second: a,
            }),
            Ordering::Equal => None,
        }
    }

    #[must_use]
    pub const fn first(self) -> LayerId {
        self.first
    }

    #[must_use]
    pub const fn second(self) -> LayerId {
        self.second
    }
}

impl fmt::Display for LayerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionWeight {
    pub pair: LayerPair,
    pub weight: f64,
    pub rationale: String,
}

/// Validated weights for one role. The total is 1.0 within [`WEIGHT_SUM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    role: MethodRole,
    required: BTreeSet<LayerId>,
    linear: BTreeMap<LayerId, f64>,
    interactions: Vec<InteractionWeight>,
}

impl RoleConfig {
    /// Builds a role config, returning every violated rule instead of the first.
    ///
    /// `required` defaults to the role's canonical layers when `None`.
    pub fn new(
        role: MethodRole,
        required: Option<BTreeSet<LayerId>>,
        linear: BTreeMap<LayerId, f64>,
        interactions: Vec<InteractionWeight>,
    ) -> Result<Self, Vec<Violation>> {
        let mut violations = Vec::new();
        let canonical: BTreeSet<LayerId> = role.canonical_layers().iter().copied().collect();
        let required = required.unwrap_or_else(|| canonical.clone());

        for layer in canonical.difference(&required) {
            violations.push(Violation::MissingCanonicalLayer {
                role,
                layer: *layer,
            });
        }

        for (layer, weight) in &linear {
            if !weight.is_finite() || *weight < 0.0 {
                violations.push(Violation::NegativeWeight {
                    role,
                    term: layer.to_string(),
                    weight: *weight,
                });
            }
            if !required.contains(layer) {
                violations.push(Violation::WeightOnUnrequiredLayer {
                    role,
                    layer: *layer,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for interaction in &interactions {
            let pair = interaction.pair;
            if !seen.insert(pair) {
                violations.push(Violation::DuplicateInteraction {
                    role,
                    pair: pair.to_string(),
                });
            }
            if !interaction.weight.is_finite() || interaction.weight < 0.0 {
                violations.push(Violation::NegativeWeight {
                    role,
                    term: pair.to_string(),
                    weight: interaction.weight,
                });
            }
            for layer in [pair.first(), pair.second()] {
                if !required.contains(&layer) {
                    violations.push(Violation::WeightOnUnrequiredLayer { role, layer });
                }
            }
        }

        let linear_total = compensated_sum(linear.values().copied());
        let interaction_total = compensated_sum(interactions.iter().map(|i| i.weight));
        let total = compensated_sum([linear_total, interaction_total]);
        if !total.is_finite() || (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            violations.push(Violation::UnbalancedWeights {
                role,
                linear: linear_total,
                interaction: interaction_total,
                total,
            });
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        let mut interactions = interactions;
        interactions.sort_by_key(|i| i.pair);
        Ok(Self {
            role,
            required,
            linear,
            interactions,
        })
    }

    #[must_use]
    pub const fn role(&self) -> MethodRole {
        self.role
    }

    #[must_use]
    pub const fn required_layers(&self) -> &BTreeSet<LayerId> {
        &self.required
    }

    #[must_use]
    pub const fn linear(&self) -> &BTreeMap<LayerId, f64> {
        &self.linear
    }

    /// Interaction terms sorted by pair.
    #[must_use]
    pub fn interactions(&self) -> &[InteractionWeight] {
        &self.interactions
    }

    #[must_use]
    pub fn weight_total(&self) -> f64 {
        compensated_sum([
            compensated_sum(self.linear.values().copied()),
            compensated_sum(self.interactions.iter().map(|i| i.weight)),
        ])
    }
}

pub(crate) fn build_roles(
    file: RolesFile,
    violations: &mut Violations,
) -> BTreeMap<MethodRole, RoleConfig> {
    let mut roles = BTreeMap::new();
    for (name, raw) in file.roles {
        let Ok(role) = name.parse::<MethodRole>() else {
            violations.push(Violation::UnknownRole {
                file: FILE,
                key: name,
            });
            continue;
        };

        let required = raw.required_layers.map(|names| {
            names
                .iter()
                .filter_map(|n| parse_layer(n, violations))
                .collect::<BTreeSet<_>>()
        });

        let mut linear = BTreeMap::new();
        for (key, weight) in raw.linear {
            if let Some(layer) = parse_layer(&key, violations) {
                linear.insert(layer, weight);
            }
        }

        let mut interactions = Vec::new();
        for raw_interaction in raw.interactions {
            let layers: Vec<LayerId> = raw_interaction
                .layers
                .iter()
                .filter_map(|n| parse_layer(n, violations))
                .collect();
            if raw_interaction.layers.len() != 2 {
                violations.push(Violation::MalformedInteraction {
                    role,
                    count: raw_interaction.layers.len(),
                });
                continue;
            }
            let &[a, b] = layers.as_slice() else {
                // an unknown layer name was already reported
                continue;
            };
            match LayerPair::new(a, b) {
                Some(pair) => interactions.push(InteractionWeight {
                    pair,
                    weight: raw_interaction.weight,
                    rationale: raw_interaction.rationale,
                }),
                None => violations.push(Violation::SelfInteraction { role, layer: a }),
            }
        }

        match RoleConfig::new(role, required, linear, interactions) {
            Ok(config) => {
                roles.insert(role, config);
            }
            Err(found) => violations.extend(found),
        }
    }
    roles
}

fn parse_layer(name: &str, violations: &mut Violations) -> Option<LayerId> {
    match name.parse::<LayerId>() {
        Ok(layer) => Some(layer),
        Err(_) => {
            violations.push(Violation::UnknownLayer {
                file: FILE,
                key: name.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use verity_types::{LayerId, MethodRole};

    use super::{InteractionWeight, LayerPair, RoleConfig, RolesFile, build_roles};
    use crate::violation::{Violation, Violations};

    fn scenario_weights() -> BTreeMap<LayerId, f64> {
        BTreeMap::from([
            (LayerId::Base, 0.2),
            (LayerId::Unit, 0.2),
            (LayerId::Question, 0.15),
            (LayerId::Dimension, 0.15),
            (LayerId::Policy, 0.1),
            (LayerId::Congruence, 0.1),
            (LayerId::Chain, 0.05),
            (LayerId::Meta, 0.05),
        ])
    }

    #[test]
    fn balanced_linear_weights_are_accepted() {
        let config =
            RoleConfig::new(MethodRole::ScoreQuestion, None, scenario_weights(), vec![]).unwrap();
        assert_eq!(config.required_layers().len(), 8);
        assert!((config.weight_total() - 1.0).abs() <= super::WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn interaction_weight_counts_toward_total() {
        let mut linear = scenario_weights();
        linear.insert(LayerId::Meta, 0.0);
        let interactions = vec![InteractionWeight {
            pair: LayerPair::new(LayerId::Chain, LayerId::Unit).unwrap(),
            weight: 0.05,
            rationale: String::new(),
        }];
        let config =
            RoleConfig::new(MethodRole::ScoreQuestion, None, linear, interactions).unwrap();
        assert_eq!(config.interactions().len(), 1);
        assert_eq!(config.interactions()[0].pair.first(), LayerId::Unit);
    }

    #[test]
    fn unbalanced_and_negative_weights_are_all_reported() {
        let mut linear = scenario_weights();
        linear.insert(LayerId::Base, -0.2);
        let violations =
            RoleConfig::new(MethodRole::ScoreQuestion, None, linear, vec![]).unwrap_err();
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::NegativeWeight { weight, .. } if *weight == -0.2
        )));
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, Violation::UnbalancedWeights { .. }))
        );
    }

    #[test]
    fn tolerance_is_one_nanounit() {
        let mut linear = scenario_weights();
        linear.insert(LayerId::Meta, 0.05 + 1e-10);
        assert!(RoleConfig::new(MethodRole::ScoreQuestion, None, linear.clone(), vec![]).is_ok());
        linear.insert(LayerId::Meta, 0.05 + 1e-8);
        assert!(RoleConfig::new(MethodRole::ScoreQuestion, None, linear, vec![]).is_err());
    }

    #[test]
    fn required_layers_cannot_drop_canonical_ones() {
        let required = [LayerId::Base, LayerId::Chain, LayerId::Meta].into();
        let linear = BTreeMap::from([
            (LayerId::Base, 0.5),
            (LayerId::Chain, 0.3),
            (LayerId::Meta, 0.2),
        ]);
        let violations =
            RoleConfig::new(MethodRole::ScoreQuestion, Some(required), linear, vec![])
                .unwrap_err();
        let missing: Vec<LayerId> = violations
            .iter()
            .filter_map(|v| match v {
                Violation::MissingCanonicalLayer { layer, .. } => Some(*layer),
                _ => None,
            })
            .collect();
        assert_eq!(missing.len(), 5);
    }

    #[test]
    fn toml_roles_parse_and_flag_bad_entries() {
        let file: RolesFile = toml::from_str(
            r#"
            [roles.meta_tool.linear]
            "@b" = 0.5
            "@chain" = 0.3
            "@m" = 0.1

            [[roles.meta_tool.interactions]]
            layers = ["@b", "@m"]
            weight = 0.1

            [roles.report.linear]
            "@b" = 0.4
            "@x" = 0.6

            [roles.bogus.linear]
            "@b" = 1.0

            [[roles.transform.interactions]]
            layers = ["@b", "@b"]
            weight = 1.0
            "#,
        )
        .unwrap();
        let mut violations = Violations::default();
        let roles = build_roles(file, &mut violations);
        assert!(roles.contains_key(&MethodRole::MetaTool));
        assert!(!roles.contains_key(&MethodRole::Report));

        let violations = violations.into_vec();
        assert!(violations.contains(&Violation::UnknownLayer {
            file: "roles.toml",
            key: "@x".to_string()
        }));
        assert!(violations.contains(&Violation::UnknownRole {
            file: "roles.toml",
            key: "bogus".to_string()
        }));
        assert!(violations.contains(&Violation::SelfInteraction {
            role: MethodRole::Transform,
            layer: LayerId::Base
        }));
    }
}

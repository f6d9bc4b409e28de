//! Meta-layer weights, step tables and cost thresholds (`meta.toml`).

use serde::{Deserialize, Serialize};
use verity_types::compensated_sum;

use crate::roles::WEIGHT_SUM_TOLERANCE;
use crate::violation::{Violation, Violations};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaWeights {
    pub transparency: f64,
    pub governance: f64,
    pub cost: f64,
}

impl Default for MetaWeights {
    fn default() -> Self {
        Self {
            transparency: 0.5,
            governance: 0.4,
            cost: 0.1,
        }
    }
}

/// Score at 0, 1, 2 and 3 satisfied conditions.
pub type StepTable = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaSteps {
    pub transparency: StepTable,
    pub governance: StepTable,
}

impl Default for MetaSteps {
    fn default() -> Self {
        Self {
            transparency: [0.0, 0.4, 0.7, 1.0],
            governance: [0.0, 0.33, 0.66, 1.0],
        }
    }
}

/// Runtime tiers for the cost sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostPolicy {
    pub fast_secs: f64,
    pub acceptable_secs: f64,
    pub fast_score: f64,
    pub acceptable_score: f64,
    pub slow_score: f64,
    /// Applied when no runtime sample exists.
    pub unmeasured_score: f64,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self {
            fast_secs: 1.0,
            acceptable_secs: 5.0,
            fast_score: 1.0,
            acceptable_score: 0.8,
            slow_score: 0.5,
            unmeasured_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetaConfig {
    pub weights: MetaWeights,
    pub steps: MetaSteps,
    pub cost: CostPolicy,
}

fn steps_valid(steps: &StepTable) -> bool {
    steps.iter().all(|s| (0.0..=1.0).contains(s)) && steps.windows(2).all(|w| w[0] <= w[1])
}

pub(crate) fn check_meta(config: &MetaConfig, violations: &mut Violations) {
    let MetaWeights {
        transparency,
        governance,
        cost,
    } = config.weights;
    let parts = [transparency, governance, cost];
    if parts.iter().any(|w| !w.is_finite() || *w < 0.0)
        || (compensated_sum(parts) - 1.0).abs() > WEIGHT_SUM_TOLERANCE
    {
        violations.push(Violation::MetaWeights {
            transparency,
            governance,
            cost,
        });
    }

    for (name, steps) in [
        ("transparency", &config.steps.transparency),
        ("governance", &config.steps.governance),
    ] {
        if !steps_valid(steps) {
            violations.push(Violation::MetaSteps {
                name,
                steps: steps.to_vec(),
            });
        }
    }

    let policy = config.cost;
    if !(policy.fast_secs > 0.0 && policy.fast_secs <= policy.acceptable_secs) {
        violations.push(Violation::CostThresholds {
            fast_secs: policy.fast_secs,
            acceptable_secs: policy.acceptable_secs,
        });
    }
    for (field, value) in [
        ("cost.fast_score", policy.fast_score),
        ("cost.acceptable_score", policy.acceptable_score),
        ("cost.slow_score", policy.slow_score),
        ("cost.unmeasured_score", policy.unmeasured_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            violations.push(Violation::ScoreOutOfRange {
                method_id: "meta".to_string(),
                field: field.to_string(),
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MetaConfig, check_meta};
    use crate::violation::{Violation, Violations};

    #[test]
    fn defaults_are_valid() {
        let mut violations = Violations::default();
        check_meta(&MetaConfig::default(), &mut violations);
        assert!(violations.is_empty());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config: MetaConfig = toml::from_str(
            r"
            [cost]
            fast_secs = 0.5
            ",
        )
        .unwrap();
        assert_eq!(config.cost.fast_secs, 0.5);
        assert_eq!(config.cost.acceptable_secs, 5.0);
        assert_eq!(config.weights.transparency, 0.5);
    }

    #[test]
    fn invalid_meta_config_reports_each_problem() {
        let config: MetaConfig = toml::from_str(
            r"
            [weights]
            transparency = 0.6
            governance = 0.4
            cost = 0.1

            [steps]
            transparency = [0.0, 0.7, 0.4, 1.0]
            governance = [0.0, 0.33, 0.66, 1.0]

            [cost]
            fast_secs = 10.0
            acceptable_secs = 5.0
            ",
        )
        .unwrap();
        let mut violations = Violations::default();
        check_meta(&config, &mut violations);
        let violations = violations.into_vec();
        assert_eq!(violations.len(), 3);
        assert!(matches!(violations[0], Violation::MetaWeights { .. }));
        assert!(matches!(
            violations[1],
            Violation::MetaSteps {
                name: "transparency",
                ..
            }
        ));
        assert!(matches!(violations[2], Violation::CostThresholds { .. }));
    }
}

//! 2-additive Choquet fusion of layer scores.
//!
//! `final = Σ a_l·x_l + Σ a_lk·min(x_l, x_k)`
//!
//! A layer the role requires but no evaluator could score enters both sums as 0.0.
//! The total is checked against `[0, 1]` afterwards and never clamped.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use verity_config::{InteractionWeight, LayerPair, RoleConfig, WEIGHT_SUM_TOLERANCE};
use verity_types::{LayerId, LayerScore, MethodRole, Score, compensated_sum};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearContribution {
    pub layer: LayerId,
    pub weight: f64,
    pub score: Score,
    /// True when the layer had no score and entered the sum as 0.0.
    pub missing: bool,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionContribution {
    pub pair: LayerPair,
    pub weight: f64,
    /// `min` of the two linked layer scores.
    pub score: Score,
    pub contribution: f64,
    pub rationale: String,
}

/// The aggregate fell outside `[0, 1]`. Only reachable with a defective weight set.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "aggregate {value} for role {role} is outside [0, 1] (linear {linear}, interaction {interaction})"
)]
pub struct BoundsViolation {
    pub role: MethodRole,
    pub value: f64,
    pub linear: f64,
    pub interaction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub linear: Vec<LinearContribution>,
    pub interactions: Vec<InteractionContribution>,
    pub missing_layers: Vec<LayerId>,
    pub final_score: Score,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChoquetAggregator;

impl ChoquetAggregator {
    pub fn aggregate(
        &self,
        config: &RoleConfig,
        scores: &BTreeMap<LayerId, LayerScore>,
    ) -> Result<Aggregation, BoundsViolation> {
        let missing_layers: Vec<LayerId> = config
            .required_layers()
            .iter()
            .filter(|layer| !scores.contains_key(layer))
            .copied()
            .collect();
        for layer in &missing_layers {
            tracing::warn!(role = %config.role(), layer = %layer, "Required layer has no score, aggregating as 0.0");
        }
        self.aggregate_terms(config.role(), config.linear(), config.interactions(), scores)
            .map(|mut aggregation| {
                aggregation.missing_layers = missing_layers;
                aggregation
            })
    }

    /// Aggregates against raw weight terms. Terms are summed in layer order.
    pub fn aggregate_terms(
        &self,
        role: MethodRole,
        linear: &BTreeMap<LayerId, f64>,
        interactions: &[InteractionWeight],
        scores: &BTreeMap<LayerId, LayerScore>,
    ) -> Result<Aggregation, BoundsViolation> {
        let score_of = |layer: LayerId| scores.get(&layer).map_or(Score::ZERO, LayerScore::score);

        let linear: Vec<LinearContribution> = linear
            .iter()
            .map(|(&layer, &weight)| {
                let score = score_of(layer);
                LinearContribution {
                    layer,
                    weight,
                    score,
                    missing: !scores.contains_key(&layer),
                    contribution: weight * score.get(),
                }
            })
            .collect();

        let interactions: Vec<InteractionContribution> = interactions
            .iter()
            .map(|term| {
                let score = score_of(term.pair.first()).min(score_of(term.pair.second()));
                InteractionContribution {
                    pair: term.pair,
                    weight: term.weight,
                    score,
                    contribution: term.weight * score.get(),
                    rationale: term.rationale.clone(),
                }
            })
            .collect();

        let linear_total = compensated_sum(linear.iter().map(|c| c.contribution));
        let interaction_total = compensated_sum(interactions.iter().map(|c| c.contribution));
        let value = compensated_sum(
            linear
                .iter()
                .map(|c| c.contribution)
                .chain(interactions.iter().map(|c| c.contribution)),
        );

        let final_score = Score::new(snap_to_unit(value)).map_err(|_| BoundsViolation {
            role,
            value,
            linear: linear_total,
            interaction: interaction_total,
        })?;

        let missing_layers = linear.iter().filter(|c| c.missing).map(|c| c.layer).collect();
        Ok(Aggregation {
            linear,
            interactions,
            missing_layers,
            final_score,
        })
    }
}

/// Weight sets are accepted with a total within [`WEIGHT_SUM_TOLERANCE`] of 1.0,
/// so an aggregate may overshoot `[0, 1]` by at most that much.
fn snap_to_unit(value: f64) -> f64 {
    if (-WEIGHT_SUM_TOLERANCE..=1.0 + WEIGHT_SUM_TOLERANCE).contains(&value) {
        value.clamp(0.0, 1.0)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use verity_config::{InteractionWeight, LayerPair, RoleConfig};
    use verity_types::{
        BaseComponents, ChainComponents, CongruenceComponents, ContextualComponents, CostSample,
        LayerComponents, LayerId, LayerScore, MetaComponents, MethodRole, Score, UnitComponents,
    };

    use super::{BoundsViolation, ChoquetAggregator};

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

    fn score(layer: LayerId, value: f64) -> LayerScore {
        let s = Score::new(value).unwrap();
        let contextual = || ContextualComponents {
            target: "T".to_string(),
            compatibility: s,
            declared: true,
        };
        let components = match layer {
            LayerId::Base => LayerComponents::Base(BaseComponents {
                theory: s,
                implementation: s,
                deployment: s,
                from_default: false,
            }),
            LayerId::Unit => LayerComponents::Unit(UnitComponents {
                coverage: s,
                structural_completeness: Score::ONE,
            }),
            LayerId::Question => LayerComponents::Question(contextual()),
            LayerId::Dimension => LayerComponents::Dimension(contextual()),
            LayerId::Policy => LayerComponents::Policy(contextual()),
            LayerId::Congruence => LayerComponents::Congruence(CongruenceComponents {
                scale: s,
                semantic: Score::ONE,
                fusion: Score::ONE,
                ensemble_size: 1,
            }),
            LayerId::Chain => LayerComponents::Chain(ChainComponents {
                required_declared: 0,
                required_supplied: 0,
                optional_declared: 0,
                optional_supplied: 0,
                missing_required: Vec::new(),
            }),
            LayerId::Meta => LayerComponents::Meta(MetaComponents {
                transparency: s,
                governance: s,
                cost: s,
                runtime: CostSample::Unmeasured,
            }),
        };
        LayerScore::new(value, components).unwrap()
    }

    fn uniform(value: f64) -> BTreeMap<LayerId, LayerScore> {
        LayerId::ALL.into_iter().map(|l| (l, score(l, value))).collect()
    }

    fn score_question() -> RoleConfig {
        RoleConfig::new(MethodRole::ScoreQuestion, None, scenario_weights(), vec![]).unwrap()
    }

    #[test]
    fn all_perfect_layers_aggregate_to_one() {
        let result = ChoquetAggregator
            .aggregate(&score_question(), &uniform(1.0))
            .unwrap();
        assert_eq!(result.final_score.get(), 1.0);
        assert!(result.missing_layers.is_empty());
    }

    #[test]
    fn all_zero_layers_aggregate_to_zero() {
        let result = ChoquetAggregator
            .aggregate(&score_question(), &uniform(0.0))
            .unwrap();
        assert_eq!(result.final_score.get(), 0.0);
    }

    #[test]
    fn missing_layer_stays_in_the_sum_as_zero() {
        let config = score_question();
        let complete = ChoquetAggregator.aggregate(&config, &uniform(1.0)).unwrap();

        let mut partial = uniform(1.0);
        partial.remove(&LayerId::Unit);
        let result = ChoquetAggregator.aggregate(&config, &partial).unwrap();

        assert_eq!(result.missing_layers, vec![LayerId::Unit]);
        assert_eq!(result.linear.len(), 8);
        let unit = result
            .linear
            .iter()
            .find(|c| c.layer == LayerId::Unit)
            .unwrap();
        assert!(unit.missing);
        assert_eq!(unit.contribution, 0.0);
        assert!(result.final_score <= complete.final_score);
        assert!((result.final_score.get() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn interaction_uses_weaker_layer() {
        let pair = LayerPair::new(LayerId::Unit, LayerId::Chain).unwrap();
        let config = RoleConfig::new(
            MethodRole::ScoreQuestion,
            None,
            BTreeMap::from([(LayerId::Unit, 0.5), (LayerId::Chain, 0.3)]),
            vec![InteractionWeight {
                pair,
                weight: 0.2,
                rationale: "weak link".to_string(),
            }],
        )
        .unwrap();
        let scores = BTreeMap::from([
            (LayerId::Unit, score(LayerId::Unit, 1.0)),
            (LayerId::Chain, score(LayerId::Chain, 0.0)),
        ]);
        let result = ChoquetAggregator.aggregate(&config, &scores).unwrap();
        assert_eq!(result.interactions.len(), 1);
        assert_eq!(result.interactions[0].score, Score::ZERO);
        assert_eq!(result.final_score.get(), 0.5);
    }

    #[test]
    fn overweighted_terms_are_a_bounds_violation() {
        let linear = BTreeMap::from([(LayerId::Base, 0.9), (LayerId::Meta, 0.6)]);
        let err = ChoquetAggregator
            .aggregate_terms(MethodRole::Report, &linear, &[], &uniform(1.0))
            .unwrap_err();
        assert_eq!(
            err,
            BoundsViolation {
                role: MethodRole::Report,
                value: 1.5,
                linear: 1.5,
                interaction: 0.0,
            }
        );
    }

    #[test]
    fn weights_at_the_tolerance_edge_still_score_one() {
        let mut linear = scenario_weights();
        linear.insert(LayerId::Meta, 0.05 + 1e-10);
        let config = RoleConfig::new(MethodRole::ScoreQuestion, None, linear, vec![]).unwrap();
        let result = ChoquetAggregator.aggregate(&config, &uniform(1.0)).unwrap();
        assert_eq!(result.final_score.get(), 1.0);
    }

    #[test]
    fn aggregation_is_bit_identical_across_runs() {
        let config = score_question();
        let mut scores = uniform(0.37);
        scores.insert(LayerId::Meta, score(LayerId::Meta, 0.91));
        let a = ChoquetAggregator.aggregate(&config, &scores).unwrap();
        let b = ChoquetAggregator.aggregate(&config, &scores).unwrap();
        assert_eq!(a.final_score.get().to_bits(), b.final_score.get().to_bits());
        assert_eq!(a, b);
    }
}

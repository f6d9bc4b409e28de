//! Meta layer (@m): transparency, governance and cost of running the method.
//!
//! Each of transparency and governance counts how many of three boolean
//! conditions hold and maps the count through a configured step table. Cost is
//! tiered against the fast / acceptable runtime thresholds.

use verity_config::{ConfigHash, CostPolicy, MetaConfig, StepTable};
use verity_types::{
    CostSample, LayerComponents, LayerScore, LayerScoreError, MetaComponents, Score,
    compensated_sum,
};

use crate::inputs::GovernanceEvidence;

pub fn evaluate(
    config: &MetaConfig,
    governance: Option<&GovernanceEvidence>,
    config_hash: &ConfigHash,
) -> Result<Option<LayerScore>, LayerScoreError> {
    let Some(evidence) = governance else {
        return Ok(None);
    };

    let transparency = step(
        &config.steps.transparency,
        [
            evidence.formula_documented,
            evidence.full_trace,
            evidence.logs_conform,
        ],
    );
    let governance = step(
        &config.steps.governance,
        [
            evidence
                .version_tag
                .as_deref()
                .is_some_and(|tag| !tag.trim().is_empty()),
            evidence.config_hash.as_deref() == Some(config_hash.as_str()),
            evidence.signature_valid,
        ],
    );
    let cost = cost_score(&config.cost, evidence.runtime);

    let weights = config.weights;
    let value = compensated_sum([
        weights.transparency * transparency,
        weights.governance * governance,
        weights.cost * cost,
    ]);
    let components = LayerComponents::Meta(MetaComponents {
        transparency: sub_score(transparency),
        governance: sub_score(governance),
        cost: sub_score(cost),
        runtime: evidence.runtime,
    });
    LayerScore::new(value, components).map(Some)
}

fn step(table: &StepTable, conditions: [bool; 3]) -> f64 {
    let met = conditions.iter().filter(|c| **c).count();
    table[met]
}

/// Runtime band a sample falls in. Samples in the same band score the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostTier {
    Unmeasured,
    /// Negative or non-finite measurement.
    Invalid,
    Fast,
    Acceptable,
    Slow,
}

impl CostTier {
    #[must_use]
    pub fn of(policy: &CostPolicy, sample: CostSample) -> Self {
        match sample {
            CostSample::Unmeasured => CostTier::Unmeasured,
            CostSample::Measured { seconds } if !seconds.is_finite() || seconds < 0.0 => {
                CostTier::Invalid
            }
            CostSample::Measured { seconds } if seconds < policy.fast_secs => CostTier::Fast,
            CostSample::Measured { seconds } if seconds < policy.acceptable_secs => {
                CostTier::Acceptable
            }
            CostSample::Measured { .. } => CostTier::Slow,
        }
    }

    #[must_use]
    pub fn score(self, policy: &CostPolicy) -> f64 {
        match self {
            CostTier::Unmeasured => policy.unmeasured_score,
            CostTier::Invalid => 0.0,
            CostTier::Fast => policy.fast_score,
            CostTier::Acceptable => policy.acceptable_score,
            CostTier::Slow => policy.slow_score,
        }
    }
}

/// Tiered cost. A negative or non-finite measurement scores 0.0.
#[must_use]
pub fn cost_score(policy: &CostPolicy, sample: CostSample) -> f64 {
    CostTier::of(policy, sample).score(policy)
}

// step tables and cost scores are validated into [0, 1] at config load
fn sub_score(value: f64) -> Score {
    Score::new(value).unwrap_or(Score::ZERO)
}

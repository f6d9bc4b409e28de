//! Base layer (@b): weighted mean of the registry's intrinsic sub-scores.

use verity_config::{BaseWeights, ResolvedEntry};
use verity_types::{BaseComponents, LayerComponents, LayerScore, LayerScoreError, compensated_sum};

pub fn evaluate(
    entry: Option<ResolvedEntry<'_>>,
    weights: BaseWeights,
) -> Result<Option<LayerScore>, LayerScoreError> {
    let Some(resolved) = entry else {
        return Ok(None);
    };
    let entry = resolved.entry();
    let value = compensated_sum([
        weights.theory * entry.theory.get(),
        weights.implementation * entry.implementation.get(),
        weights.deployment * entry.deployment.get(),
    ]);
    let components = LayerComponents::Base(BaseComponents {
        theory: entry.theory,
        implementation: entry.implementation,
        deployment: entry.deployment,
        from_default: resolved.is_default(),
    });
    LayerScore::new(value, components).map(Some)
}

//! Contextual layers (@q, @d, @p): compatibility-table lookups.

use verity_config::CompatibilityTable;
use verity_types::{
    CalibrationContext, ContextualComponents, LayerComponents, LayerId, LayerScore,
    LayerScoreError,
};

/// Scores `method_id` against the context slot for `layer`.
///
/// A context with no id in that slot leaves the layer missing. Non-contextual
/// layers always return `Ok(None)`.
pub fn evaluate(
    layer: LayerId,
    table: &CompatibilityTable,
    method_id: &str,
    context: &CalibrationContext,
) -> Result<Option<LayerScore>, LayerScoreError> {
    let Some(target) = context.target(layer) else {
        return Ok(None);
    };
    let compat = table.lookup(method_id, layer, target);
    let components = ContextualComponents {
        target: target.to_string(),
        compatibility: compat.value,
        declared: compat.declared,
    };
    let components = match layer {
        LayerId::Question => LayerComponents::Question(components),
        LayerId::Dimension => LayerComponents::Dimension(components),
        LayerId::Policy => LayerComponents::Policy(components),
        _ => return Ok(None),
    };
    LayerScore::new(compat.value.get(), components).map(Some)
}

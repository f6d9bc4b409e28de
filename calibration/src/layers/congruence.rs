//! Congruence layer (@C): does this method fit the ensemble it is fused into?
//!
//! `scale x semantic x fusion`, where
//! - scale is 1.0 for identical output ranges, 0.8 when both sit in `[0, 1]`, else 0.0;
//! - semantic is the Jaccard overlap of declared inputs and the ensemble's available inputs;
//! - fusion is 1.0 only when every input the fusion strategy requires is available.
//!
//! A method running alone has nothing to be incongruent with and scores 1.0.

use std::collections::BTreeSet;

use verity_types::{
    CongruenceComponents, EnsemblePosition, LayerComponents, LayerScore, LayerScoreError,
    MethodSignature, Score, ValueRange,
};

use crate::inputs::EnsembleObservation;

/// Scale factor for distinct ranges that both lie inside `[0, 1]`.
pub const CONVERTIBLE_SCALE: f64 = 0.8;

pub fn evaluate(
    signature: Option<&MethodSignature>,
    output_range: Option<ValueRange>,
    position: EnsemblePosition,
    ensemble: Option<&EnsembleObservation>,
) -> Result<Option<LayerScore>, LayerScoreError> {
    let Some(signature) = signature else {
        return Ok(None);
    };

    if position.is_solo() {
        let components = LayerComponents::Congruence(CongruenceComponents {
            scale: Score::ONE,
            semantic: Score::ONE,
            fusion: Score::ONE,
            ensemble_size: 1,
        });
        return LayerScore::new(1.0, components).map(Some);
    }

    let (Some(output_range), Some(ensemble)) = (output_range, ensemble) else {
        return Ok(None);
    };

    let scale = scale_factor(output_range, ensemble.output_range);
    let semantic = jaccard(&signature.declared_inputs(), &ensemble.available_inputs);
    let fusion = match &signature.fusion {
        Some(fusion)
            if fusion
                .requires
                .iter()
                .all(|input| ensemble.available_inputs.contains(input)) =>
        {
            1.0
        }
        Some(_) => 0.0,
        // no declared strategy means no requirements to violate
        None => 1.0,
    };

    let value = scale * semantic * fusion;
    let components = LayerComponents::Congruence(CongruenceComponents {
        scale: sub_score(scale),
        semantic: sub_score(semantic),
        fusion: sub_score(fusion),
        ensemble_size: position.size(),
    });
    LayerScore::new(value, components).map(Some)
}

fn scale_factor(own: ValueRange, ensemble: ValueRange) -> f64 {
    if own == ensemble {
        1.0
    } else if own.within_unit() && ensemble.within_unit() {
        CONVERTIBLE_SCALE
    } else {
        0.0
    }
}

/// `|a ∩ b| / |a ∪ b|`, 0.0 when both are empty.
fn jaccard(declared: &BTreeSet<&str>, available: &BTreeSet<String>) -> f64 {
    let available: BTreeSet<&str> = available.iter().map(String::as_str).collect();
    let union = declared.union(&available).count();
    if union == 0 {
        return 0.0;
    }
    declared.intersection(&available).count() as f64 / union as f64
}

// factors above are built from ratios of counts and constants in [0, 1]
fn sub_score(value: f64) -> Score {
    Score::new(value).unwrap_or(Score::ZERO)
}

//! Unit layer (@u): coverage x structural completeness of the consumed data.

use verity_types::{LayerComponents, LayerScore, LayerScoreError, UnitComponents};

use crate::inputs::UnitObservation;

pub fn evaluate(observation: Option<&UnitObservation>) -> Result<Option<LayerScore>, LayerScoreError> {
    let Some(observation) = observation else {
        return Ok(None);
    };
    let value = observation.coverage.get() * observation.structural_completeness.get();
    let components = LayerComponents::Unit(UnitComponents {
        coverage: observation.coverage,
        structural_completeness: observation.structural_completeness,
    });
    LayerScore::new(value, components).map(Some)
}

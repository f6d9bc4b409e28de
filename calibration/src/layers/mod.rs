//! The eight layer evaluators.
//!
//! Each evaluator is a pure function of its inputs. `Ok(None)` means the layer's
//! observation was not available; the aggregator turns that into a 0.0 term.
//! `Err` only happens when an evaluator computes a value outside `[0, 1]`, which
//! is a defect.

pub mod base;
pub mod chain;
pub mod congruence;
pub mod contextual;
pub mod meta;
pub mod unit;

use verity_config::{CalibrationSet, ResolvedEntry};
use verity_types::{CalibrationSubject, LayerId, LayerScore, LayerScoreError, MethodSignature};

use crate::inputs::LayerInputs;

/// Everything an evaluator may read for one subject.
#[derive(Clone, Copy)]
pub struct LayerContext<'a> {
    pub subject: &'a CalibrationSubject,
    pub inputs: &'a LayerInputs,
    pub set: &'a CalibrationSet,
    pub entry: Option<ResolvedEntry<'a>>,
    pub signature: Option<&'a MethodSignature>,
}

pub fn evaluate(layer: LayerId, ctx: &LayerContext<'_>) -> Result<Option<LayerScore>, LayerScoreError> {
    match layer {
        LayerId::Base => base::evaluate(ctx.entry, ctx.set.registry().base_weights()),
        LayerId::Unit => unit::evaluate(ctx.inputs.unit.as_ref()),
        LayerId::Question | LayerId::Dimension | LayerId::Policy => contextual::evaluate(
            layer,
            ctx.set.compatibility(),
            ctx.subject.method_id(),
            ctx.subject.context(),
        ),
        LayerId::Congruence => congruence::evaluate(
            ctx.signature,
            ctx.entry.map(|e| e.entry().output_range),
            ctx.subject.position(),
            ctx.inputs.ensemble.as_ref(),
        ),
        LayerId::Chain => chain::evaluate(ctx.signature, ctx.inputs.upstream.as_ref()),
        LayerId::Meta => meta::evaluate(
            ctx.set.meta(),
            ctx.inputs.governance.as_ref(),
            ctx.set.hash(),
        ),
    }
}

//! Chain layer (@chain): how much of a method's declared input was actually
//! supplied upstream.
//!
//! Required inputs count fully, optional inputs count at [`OPTIONAL_CREDIT`].
//! A method that declares nothing has nothing to miss and scores 1.0.

use std::collections::BTreeSet;

use verity_types::{ChainComponents, LayerComponents, LayerScore, LayerScoreError, MethodSignature};

/// Weight of an optional input relative to a required one.
pub const OPTIONAL_CREDIT: f64 = 0.5;

pub fn evaluate(
    signature: Option<&MethodSignature>,
    upstream: Option<&BTreeSet<String>>,
) -> Result<Option<LayerScore>, LayerScoreError> {
    let (Some(signature), Some(upstream)) = (signature, upstream) else {
        return Ok(None);
    };

    let required: Vec<&str> = signature.required_inputs().collect();
    let optional: Vec<&str> = signature.optional_inputs().collect();
    let missing_required: Vec<String> = required
        .iter()
        .filter(|name| !upstream.contains(**name))
        .map(|name| (*name).to_string())
        .collect();
    let required_supplied = required.len() - missing_required.len();
    let optional_supplied = optional
        .iter()
        .filter(|name| upstream.contains(**name))
        .count();

    let declared = required.len() as f64 + OPTIONAL_CREDIT * optional.len() as f64;
    let value = if declared == 0.0 {
        1.0
    } else {
        (required_supplied as f64 + OPTIONAL_CREDIT * optional_supplied as f64) / declared
    };

    if !missing_required.is_empty() {
        tracing::warn!(
            method = %signature.method_id,
            missing = ?missing_required,
            "Required inputs not supplied upstream"
        );
    }

    let components = LayerComponents::Chain(ChainComponents {
        required_declared: required.len(),
        required_supplied,
        optional_declared: optional.len(),
        optional_supplied,
        missing_required,
    });
    LayerScore::new(value, components).map(Some)
}

//! The sample configuration shipped in `demos/` stays valid

use std::fs;
use std::sync::Arc;

use verity_calibration::{CalibrationMode, CalibrationOrchestrator, LayerInputs};
use verity_config::CalibrationSet;
use verity_resources::Priority;
use verity_runtime::EngineSettings;
use verity_types::{CalibrationSubject, EnsemblePosition, LayerId};

use crate::common::{context, demo_calibration_dir};

#[test]
fn demo_engine_settings_parse_and_resolve() {
    let path = demo_calibration_dir()
        .parent()
        .expect("demos dir")
        .join("engine.toml");
    let settings = EngineSettings::load_from(&path).unwrap();
    assert_eq!(settings.calibration.dir, path.parent().unwrap().join("calibration"));
    assert_eq!(settings.calibration.mode, CalibrationMode::Strict);
    assert_eq!(settings.resources.breaker.failure_threshold, 5);
    assert_eq!(settings.resources.policies.len(), 2);
    assert_eq!(settings.resources.policies[0].priority, Priority::High);
    assert!(settings.ledger.fsync);
}

#[test]
fn demo_calibration_set_is_valid() {
    let set = CalibrationSet::load(&demo_calibration_dir()).unwrap();
    assert_eq!(set.registry().len(), 5);
    assert_eq!(set.roles().count(), 5);
    assert_eq!(set.hash().as_str().len(), 64);
}

#[test]
fn demo_inputs_calibrate_every_layer() {
    let dir = demo_calibration_dir();
    let set = Arc::new(CalibrationSet::load(&dir).unwrap());
    let inputs: LayerInputs =
        serde_json::from_slice(&fs::read(dir.join("inputs.json")).expect("read inputs"))
            .expect("decode inputs");
    let orch = CalibrationOrchestrator::with_catalog(set, CalibrationMode::Strict);

    let subject = CalibrationSubject::new("score.coherence", context(), EnsemblePosition::solo());
    let result = orch.calibrate(&subject, &inputs).unwrap();
    assert!(result.missing_layers.is_empty());
    assert_eq!(result.layer_scores.len(), LayerId::ALL.len());
    // both required inputs supplied, the optional one missing
    assert!((result.layer_scores[&LayerId::Chain].value() - 0.8).abs() < 1e-12);
    let score = result.final_score.get();
    assert!(score > 0.0 && score < 1.0);
}

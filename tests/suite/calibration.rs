//! Calibration against a config directory loaded from disk

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use verity_calibration::{
    CalibrationMode, CalibrationOrchestrator, EnsembleObservation, GovernanceEvidence,
    LayerInputs, UnitObservation,
};
use verity_config::CalibrationSet;
use verity_types::{CalibrationSubject, CostSample, EnsemblePosition, LayerId, Score, ValueRange};

use crate::common::{context, perfect_inputs, write_calibration_dir};

fn load(dir: &Path) -> Arc<CalibrationSet> {
    Arc::new(CalibrationSet::load(dir).expect("valid calibration dir"))
}

#[test]
fn all_layers_perfect_fuse_to_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let set = load(dir.path());
    let inputs = perfect_inputs(set.hash().as_str());
    let orch = CalibrationOrchestrator::with_catalog(set, CalibrationMode::Strict);

    let subject = CalibrationSubject::new("perfect", context(), EnsemblePosition::solo());
    let result = orch.calibrate(&subject, &inputs).unwrap();
    assert_eq!(result.layer_scores.len(), 8);
    assert!(result.missing_layers.is_empty());
    assert_eq!(result.final_score, Score::ONE);
}

#[test]
fn all_layers_zero_fuse_to_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let orch = CalibrationOrchestrator::with_catalog(load(dir.path()), CalibrationMode::Strict);

    let subject =
        CalibrationSubject::new("broken", context(), EnsemblePosition::new(0, 2).unwrap());
    let inputs = LayerInputs {
        unit: Some(UnitObservation {
            coverage: Score::ZERO,
            structural_completeness: Score::ONE,
        }),
        upstream: Some(BTreeSet::new()),
        ensemble: Some(EnsembleObservation {
            available_inputs: BTreeSet::from(["text".to_string()]),
            output_range: ValueRange::new(0.0, 100.0).unwrap(),
        }),
        governance: Some(GovernanceEvidence {
            runtime: CostSample::Measured { seconds: -1.0 },
            ..GovernanceEvidence::default()
        }),
        role_hint: None,
    };

    let result = orch.calibrate(&subject, &inputs).unwrap();
    assert_eq!(result.layer_scores.len(), 8);
    assert_eq!(result.final_score, Score::ZERO);
}

#[test]
fn missing_layer_scores_zero_and_lowers_the_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let set = load(dir.path());
    let complete = perfect_inputs(set.hash().as_str());
    let mut partial = complete.clone();
    partial.unit = None;
    let orch = CalibrationOrchestrator::with_catalog(set, CalibrationMode::Strict);
    let subject = CalibrationSubject::new("perfect", context(), EnsemblePosition::solo());

    let full = orch.calibrate(&subject, &complete).unwrap();
    let reduced = orch.calibrate(&subject, &partial).unwrap();
    assert_eq!(reduced.missing_layers, vec![LayerId::Unit]);
    let unit_term = reduced
        .linear
        .iter()
        .find(|term| term.layer == LayerId::Unit)
        .expect("missing layer keeps its linear term");
    assert!(unit_term.missing);
    assert_eq!(unit_term.score, Score::ZERO);
    assert!(reduced.final_score < full.final_score);
    assert!((full.final_score.get() - reduced.final_score.get() - 0.2).abs() < 1e-12);
}

#[test]
fn editing_a_config_file_changes_the_hash() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let before = load(dir.path());

    let intrinsic = dir.path().join("intrinsic.toml");
    let text = fs::read_to_string(&intrinsic).expect("read intrinsic");
    fs::write(&intrinsic, text.replace("theory = 0.8", "theory = 0.6")).expect("write intrinsic");
    let after = load(dir.path());
    assert_ne!(before.hash(), after.hash());

    // meta governance checks the hash the method ran under
    let stale = perfect_inputs(before.hash().as_str());
    let orch = CalibrationOrchestrator::with_catalog(after, CalibrationMode::Strict);
    let subject = CalibrationSubject::new("perfect", context(), EnsemblePosition::solo());
    let result = orch.calibrate(&subject, &stale).unwrap();
    assert!(result.layer_scores[&LayerId::Meta].value() < 1.0);
    assert!(result.final_score < Score::ONE);
}

#[test]
fn invalid_directory_reports_every_violation() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    fs::write(
        dir.path().join("compatibility.toml"),
        r#"
        undeclared = 1.0

        [universe]
        questions = ["Q1"]
        dimensions = ["D1"]
        policy_areas = ["PA1"]

        [methods.perfect]
        questions = { Q1 = 1.0 }
        dimensions = { D1 = 1.0 }
        policy_areas = { PA1 = 1.0 }
        "#,
    )
    .expect("write compatibility");

    let err = CalibrationSet::load(dir.path()).unwrap_err();
    assert_eq!(err.violations().len(), 2);
}

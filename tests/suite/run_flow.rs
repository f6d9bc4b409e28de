//! Boot from a settings file, run methods, reboot onto the same ledger

use std::fs;

use serde_json::json;
use verity_ledger::{GENESIS, LedgerError, derive_seed, verify_file};
use verity_runtime::{EngineSettings, RunRequest, Runtime, RuntimeError};
use verity_types::LayerId;

use crate::common::{Lowercase, context, perfect_inputs, probe, settings, write_calibration_dir};

fn request(runtime: &Runtime, correlation_id: &str, text: &str) -> RunRequest {
    let hash = runtime.calibration().set().hash().as_str().to_string();
    RunRequest::new("plan_2024", correlation_id, json!({ "text": text }))
        .with_context(context())
        .with_inputs(perfect_inputs(&hash))
}

#[tokio::test]
async fn boot_run_and_reboot_extend_one_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let ledger_path = dir.path().join("evidence.json");

    let runtime = Runtime::boot_with_probe(settings(dir.path()), probe(0.1)).unwrap();
    let first = runtime
        .run_method(request(&runtime, "exec_001", "Hello"), &Lowercase)
        .await
        .unwrap();
    let second = runtime
        .run_method(request(&runtime, "exec_002", "World"), &Lowercase)
        .await
        .unwrap();

    let numpy = derive_seed("plan_2024:exec_001:numpy");
    assert_eq!(first.report.output["text"], json!("hello"));
    assert_eq!(first.report.output["numpy_seed"], json!(numpy));
    assert_ne!(second.seeds["numpy"], numpy);

    // base 0.79, chain 1.0, meta 1.0
    assert!((first.calibration.final_score.get() - 0.895).abs() < 1e-12);
    assert_eq!(
        first.calibration.layer_scores.keys().copied().collect::<Vec<_>>(),
        [LayerId::Base, LayerId::Chain, LayerId::Meta]
    );

    assert_eq!(first.evidence.previous_hash, GENESIS);
    assert_eq!(second.evidence.previous_hash, first.evidence.entry_hash);
    assert_eq!(second.evidence.metadata["correlation_id"], json!("exec_002"));
    assert_eq!(verify_file(&ledger_path).unwrap(), 2);

    let status = serde_json::to_value(runtime.status()).unwrap();
    assert_eq!(status["ledger_records"], json!(2));
    assert_eq!(
        status["config_hash"],
        json!(runtime.calibration().set().hash().as_str())
    );
    drop(runtime);

    let rebooted = Runtime::boot_with_probe(settings(dir.path()), probe(0.1)).unwrap();
    let third = rebooted
        .run_method(request(&rebooted, "exec_003", "Again"), &Lowercase)
        .await
        .unwrap();
    assert_eq!(third.evidence.index, 2);
    assert_eq!(third.evidence.previous_hash, second.evidence.entry_hash);
    assert_eq!(verify_file(&ledger_path).unwrap(), 3);
}

#[tokio::test]
async fn pressure_degrades_the_work_the_unit_sees() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let runtime = Runtime::boot_with_probe(settings(dir.path()), probe(0.9)).unwrap();

    let run = runtime
        .run_method(request(&runtime, "exec_001", "Hello"), &Lowercase)
        .await
        .unwrap();
    assert_eq!(run.report.output["max_entities"], json!(500));
    assert!(run.report.context.disable_expensive_computations);
    assert_eq!(
        run.evidence.metadata["degradation"]["disable_expensive_computations"],
        json!(true)
    );
}

#[tokio::test]
async fn failed_unit_is_recorded_and_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_calibration_dir(dir.path());
    let runtime = Runtime::boot_with_probe(settings(dir.path()), probe(0.1)).unwrap();

    let request = RunRequest::new("plan_2024", "exec_001", json!({ "html": "<p>" }));
    let err = runtime.run_method(request, &Lowercase).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Execution(_)));
    assert!(!err.is_fatal());
    assert!(runtime.halted().is_none());

    let records = runtime.evidence().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata["status"], json!("failed"));
    assert!(records[0].evidence[0].contains("payload has no text"));
}

#[test]
fn boot_from_settings_file_refuses_a_tampered_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calibration = dir.path().join("calibration");
    fs::create_dir(&calibration).expect("mkdir");
    write_calibration_dir(&calibration);
    let settings_path = dir.path().join("engine.toml");
    fs::write(
        &settings_path,
        "[calibration]\ndir = \"calibration\"\n\n[ledger]\npath = \"evidence.json\"\nfsync = false\n",
    )
    .expect("write settings");

    let settings = EngineSettings::load_from(&settings_path).unwrap();
    {
        let runtime = Runtime::boot_with_probe(settings.clone(), probe(0.1)).unwrap();
        runtime
            .evidence()
            .append("normalize.text", vec!["final_score:0.895".to_string()], Default::default())
            .unwrap();
    }

    let ledger = dir.path().join("evidence.json");
    let text = fs::read_to_string(&ledger).expect("read ledger");
    fs::write(&ledger, text.replace("0.895", "0.995")).expect("write ledger");

    let err = Runtime::boot_with_probe(settings, probe(0.1)).err().expect("boot must fail");
    assert!(err.is_fatal());
    assert!(matches!(err, RuntimeError::Ledger(LedgerError::Chain(_))));
}

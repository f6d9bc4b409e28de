//! Shared test utilities and fixtures
//!
//! Calibration directories on disk, probes with a fixed reading, and a couple
//! of execution units.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use verity_calibration::{GovernanceEvidence, LayerInputs, UnitObservation};
use verity_resources::{
    ExecutionUnit, ResourceSnapshot, StaticProbe, UnitError, UnitFuture, WorkContext,
};
use verity_runtime::EngineSettings;
use verity_types::{CalibrationContext, CostSample, Score};

pub const ROLES: &str = r#"
[roles.score_question.linear]
"@b" = 0.2
"@u" = 0.2
"@q" = 0.15
"@d" = 0.15
"@p" = 0.1
"@C" = 0.1
"@chain" = 0.05
"@m" = 0.05

[roles.transform.linear]
"@b" = 0.5
"@chain" = 0.3
"@m" = 0.2
"#;

pub const INTRINSIC: &str = r#"
[methods.perfect]
role = "score_question"
theory = 1.0
implementation = 1.0
deployment = 1.0

[methods.broken]
role = "score_question"
theory = 0.0
implementation = 0.0
deployment = 0.0

[methods."normalize.text"]
role = "transform"
theory = 0.8
implementation = 0.7
deployment = 0.9
"#;

pub const COMPATIBILITY: &str = r#"
[universe]
questions = ["Q001", "Q002"]
dimensions = ["D1", "D2"]
policy_areas = ["PA01", "PA02"]

[methods.perfect]
questions = { Q001 = 1.0 }
dimensions = { D1 = 1.0 }
policy_areas = { PA01 = 1.0 }

[methods.broken]
questions = { Q001 = 0.0 }
dimensions = { D1 = 0.0 }
policy_areas = { PA01 = 0.0 }
"#;

pub const METHODS: &str = r#"
[methods.perfect]
required = "{text}"

[methods.broken]
required = "{text}"

[methods."normalize.text"]
required = "{text}"
"#;

/// Writes a complete calibration directory into `dir`.
pub fn write_calibration_dir(dir: &Path) {
    for (name, content) in [
        ("roles.toml", ROLES),
        ("intrinsic.toml", INTRINSIC),
        ("compatibility.toml", COMPATIBILITY),
        ("methods.toml", METHODS),
    ] {
        fs::write(dir.join(name), content).expect("write calibration file");
    }
}

/// The sample calibration directory shipped in `demos/`.
pub fn demo_calibration_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("demos")
        .join("calibration")
}

pub fn context() -> CalibrationContext {
    CalibrationContext::default()
        .with_question("Q001")
        .with_dimension("D1")
        .with_policy_area("PA01")
}

/// Observations under which every layer of `perfect` scores 1.0.
pub fn perfect_inputs(config_hash: &str) -> LayerInputs {
    LayerInputs {
        unit: Some(UnitObservation {
            coverage: Score::ONE,
            structural_completeness: Score::ONE,
        }),
        upstream: Some(BTreeSet::from(["text".to_string()])),
        ensemble: None,
        governance: Some(GovernanceEvidence {
            formula_documented: true,
            full_trace: true,
            logs_conform: true,
            version_tag: Some("v1".to_string()),
            config_hash: Some(config_hash.to_string()),
            signature_valid: true,
            runtime: CostSample::Measured { seconds: 0.1 },
        }),
        role_hint: None,
    }
}

pub fn probe(memory_ratio: f64) -> Arc<StaticProbe> {
    Arc::new(StaticProbe::new(ResourceSnapshot {
        memory_ratio,
        cpu_ratio: 0.0,
        memory_available_mb: 4096.0,
    }))
}

/// Settings for a calibration dir and a file-backed ledger, both under `dir`.
pub fn settings(dir: &Path) -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.calibration.dir = dir.to_path_buf();
    settings.ledger.path = Some(dir.join("evidence.json"));
    settings.ledger.fsync = false;
    settings
}

/// Lowercases `payload.text` and reports the numpy seed it was given.
pub struct Lowercase;

impl ExecutionUnit for Lowercase {
    fn executor_id(&self) -> &str {
        "normalize.text"
    }

    fn execute<'a>(&'a self, ctx: &'a WorkContext) -> UnitFuture<'a> {
        Box::pin(async move {
            let text = ctx.payload["text"]
                .as_str()
                .ok_or_else(|| UnitError::from("payload has no text"))?;
            Ok(json!({
                "text": text.to_lowercase(),
                "numpy_seed": ctx.seeds.get("numpy"),
                "max_entities": ctx.max_entities,
            }))
        })
    }
}

/// Sleeps for `delay`, then fails or succeeds.
pub struct Flaky {
    pub id: &'static str,
    pub delay: Duration,
    pub fail: bool,
}

impl ExecutionUnit for Flaky {
    fn executor_id(&self) -> &str {
        self.id
    }

    fn execute<'a>(&'a self, _ctx: &'a WorkContext) -> UnitFuture<'a> {
        Box::pin(async move {
            sleep(self.delay).await;
            if self.fail {
                Err(UnitError::from("upstream rejected the document"))
            } else {
                Ok(json!({"ok": true}))
            }
        })
    }
}

//! The calibrated run flow.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use verity_calibration::{CalibrationResult, LayerInputs};
use verity_ledger::EvidenceRecord;
use verity_resources::{ExecutionReport, ExecutionUnit, WorkContext};
use verity_types::{CalibrationContext, CalibrationSubject, CostSample, EnsemblePosition};
use verity_utils::sha256_hex;

use crate::{Runtime, RuntimeError};

/// One method invocation: who it is for, where it sits, what it observed.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub policy_unit_id: String,
    pub correlation_id: String,
    pub context: CalibrationContext,
    pub position: EnsemblePosition,
    pub inputs: LayerInputs,
    pub work: WorkContext,
}

impl RunRequest {
    #[must_use]
    pub fn new(
        policy_unit_id: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            policy_unit_id: policy_unit_id.into(),
            correlation_id: correlation_id.into(),
            context: CalibrationContext::default(),
            position: EnsemblePosition::solo(),
            inputs: LayerInputs::default(),
            work: WorkContext::new(payload),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: CalibrationContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: EnsemblePosition) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: LayerInputs) -> Self {
        self.inputs = inputs;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MethodRun {
    pub seeds: BTreeMap<String, u32>,
    pub report: ExecutionReport,
    pub calibration: Arc<CalibrationResult>,
    pub evidence: EvidenceRecord,
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Runtime {
    /// Seeds, executes, calibrates and records one method run.
    ///
    /// Denied admissions return without side effects. Every execution that ran
    /// is recorded in the ledger, including failed ones and ones whose
    /// calibration failed, before the error is returned. Fatal calibration or
    /// ledger errors halt the runtime.
    pub async fn run_method(
        &self,
        request: RunRequest,
        unit: &dyn ExecutionUnit,
    ) -> Result<MethodRun, RuntimeError> {
        self.ensure_running()?;
        let method_id = unit.executor_id().to_string();
        let seeds = self
            .seeds
            .seeds_for_context(&request.policy_unit_id, &request.correlation_id);

        let mut work = request.work;
        work.seeds = seeds.clone();
        let report = match self.executor.execute(unit, &work).await {
            Ok(report) => report,
            Err(err) => {
                if !err.is_denied() {
                    self.record_failure(
                        err.executor_id(),
                        "failed",
                        &request.policy_unit_id,
                        &request.correlation_id,
                        &err,
                    )?;
                }
                return Err(err.into());
            }
        };

        let mut inputs = request.inputs;
        if let Some(governance) = inputs.governance.as_mut() {
            governance.runtime = CostSample::Measured {
                seconds: report.duration.as_secs_f64(),
            };
        }
        let subject = CalibrationSubject::new(&method_id, request.context, request.position);
        let calibration = match self.calibration.calibrate(&subject, &inputs) {
            Ok(calibration) => calibration,
            Err(err) => {
                self.record_failure(
                    &method_id,
                    "calibration_failed",
                    &request.policy_unit_id,
                    &request.correlation_id,
                    &err,
                )?;
                return Err(self.escalate(err.into()));
            }
        };

        let output_digest = sha256_hex(serde_json::to_vec(&report.output).unwrap_or_default());
        let final_score = calibration.final_score.get();
        let metadata = into_object(json!({
            "status": "succeeded",
            "policy_unit_id": request.policy_unit_id,
            "correlation_id": request.correlation_id,
            "execution_id": report.allocation.execution_id.to_string(),
            "config_hash": calibration.config_hash.as_str(),
            "role": calibration.role,
            "source": calibration.source,
            "final_score": final_score,
            "missing_layers": calibration.missing_layers,
            "seeds": seeds,
            "pressure": report.allocation.pressure,
            "degradation": report.allocation.degradation,
            "duration_secs": report.duration.as_secs_f64(),
        }));
        let evidence = self
            .evidence
            .append(
                &method_id,
                vec![
                    format!("output_sha256:{output_digest}"),
                    format!("final_score:{final_score}"),
                ],
                metadata,
            )
            .map_err(|err| self.escalate(err.into()))?;

        tracing::info!(
            method = %method_id,
            final_score,
            index = evidence.index,
            "Method run recorded"
        );
        Ok(MethodRun {
            seeds,
            report,
            calibration,
            evidence,
        })
    }

    fn record_failure(
        &self,
        method_id: &str,
        status: &str,
        policy_unit_id: &str,
        correlation_id: &str,
        err: &dyn Display,
    ) -> Result<(), RuntimeError> {
        let metadata = into_object(json!({
            "status": status,
            "policy_unit_id": policy_unit_id,
            "correlation_id": correlation_id,
            "config_hash": self.calibration.set().hash().as_str(),
        }));
        self.evidence
            .append(method_id, vec![format!("error:{err}")], metadata)
            .map(|_| ())
            .map_err(|ledger_err| self.escalate(ledger_err.into()))
    }
}

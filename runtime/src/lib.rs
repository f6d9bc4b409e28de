//! Boot-time wiring for verity.
//!
//! [`Runtime::boot`] builds every long-lived handle once: the validated
//! calibration set and orchestrator, the resource manager and executor, the
//! seed registry and the evidence ledger. Consumers borrow them from the
//! runtime; nothing is global.
//!
//! [`Runtime::run_method`] is the calibrated run flow: seeds → admission and
//! execution → calibration with the measured runtime → evidence record.

mod run;
pub mod settings;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use verity_calibration::{CacheStats, CalibrationError, CalibrationOrchestrator};
use verity_config::{CalibrationSet, ConfigError};
use verity_ledger::{ChainIntegrityError, EvidenceRegistry, LedgerError, SeedRegistry};
use verity_resources::{
    AdaptiveResourceManager, ExecutionError, ManagerStatus, ProcProbe, ResourceAlertManager,
    ResourceAwareExecutor, ResourceProbe, TracingSink,
};

pub use run::{MethodRun, RunRequest};
pub use settings::{
    CONFIG_ENV, CalibrationSettings, EngineSettings, LedgerSettings, SettingsError, settings_path,
};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("runtime halted: {reason}")]
    Halted { reason: String },
}

impl RuntimeError {
    /// Errors after which the runtime refuses further work.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            RuntimeError::Settings(_) | RuntimeError::Config(_) | RuntimeError::Halted { .. } => {
                true
            }
            RuntimeError::Ledger(err) => err.is_fatal(),
            RuntimeError::Calibration(err) => err.is_fatal(),
            RuntimeError::Execution(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub config_hash: String,
    pub calibration_cache: CacheStats,
    pub resources: ManagerStatus,
    pub ledger_records: usize,
    pub ledger_halted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
}

pub struct Runtime {
    settings: EngineSettings,
    calibration: CalibrationOrchestrator,
    resources: Arc<AdaptiveResourceManager>,
    executor: ResourceAwareExecutor,
    seeds: SeedRegistry,
    evidence: EvidenceRegistry,
    halted: Mutex<Option<String>>,
}

impl Runtime {
    /// Boots against the host's `/proc` resource probe.
    pub fn boot(settings: EngineSettings) -> Result<Self, RuntimeError> {
        Self::boot_with_probe(settings, Arc::new(ProcProbe))
    }

    /// Loads and validates the calibration set, opens the ledger and builds the
    /// resource manager. Any config violation aborts boot with every violation listed.
    pub fn boot_with_probe(
        settings: EngineSettings,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self, RuntimeError> {
        let set = match CalibrationSet::load(&settings.calibration.dir) {
            Ok(set) => Arc::new(set),
            Err(err) => {
                for violation in err.violations() {
                    tracing::error!("Calibration config violation: {violation}");
                }
                return Err(err.into());
            }
        };
        let calibration = CalibrationOrchestrator::with_catalog(Arc::clone(&set), settings.calibration.mode);

        let evidence = match &settings.ledger.path {
            Some(path) => EvidenceRegistry::open(path, settings.ledger.write_options())?,
            None => {
                tracing::warn!("No ledger path configured, evidence is kept in memory only");
                EvidenceRegistry::in_memory()
            }
        };

        let alerts = ResourceAlertManager::new(settings.alerts).with_sink(Arc::new(TracingSink));
        let resources = Arc::new(AdaptiveResourceManager::new(
            settings.resources.clone(),
            probe,
            alerts,
        ));
        let executor = ResourceAwareExecutor::new(Arc::clone(&resources));

        tracing::info!(
            config_hash = set.hash().short(),
            mode = ?settings.calibration.mode,
            ledger_records = evidence.len(),
            "Runtime booted"
        );
        Ok(Self {
            settings,
            calibration,
            resources,
            executor,
            seeds: SeedRegistry::new(),
            evidence,
            halted: Mutex::new(None),
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub const fn calibration(&self) -> &CalibrationOrchestrator {
        &self.calibration
    }

    #[must_use]
    pub fn resources(&self) -> &AdaptiveResourceManager {
        &self.resources
    }

    #[must_use]
    pub const fn executor(&self) -> &ResourceAwareExecutor {
        &self.executor
    }

    #[must_use]
    pub const fn seeds(&self) -> &SeedRegistry {
        &self.seeds
    }

    #[must_use]
    pub const fn evidence(&self) -> &EvidenceRegistry {
        &self.evidence
    }

    fn halted_guard(&self) -> MutexGuard<'_, Option<String>> {
        self.halted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reason the runtime stopped accepting work, if it has.
    #[must_use]
    pub fn halted(&self) -> Option<String> {
        self.halted_guard().clone()
    }

    fn ensure_running(&self) -> Result<(), RuntimeError> {
        match self.halted_guard().as_ref() {
            Some(reason) => Err(RuntimeError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Records `err` as the halt reason when it is fatal, then hands it back.
    fn escalate(&self, err: RuntimeError) -> RuntimeError {
        if err.is_fatal() {
            let mut halted = self.halted_guard();
            if halted.is_none() {
                tracing::error!("Halting runtime: {err}");
                *halted = Some(err.to_string());
            }
        }
        err
    }

    /// Verifies the evidence chain; a break halts the runtime.
    pub fn verify_ledger(&self) -> Result<(), RuntimeError> {
        self.evidence
            .verify()
            .map_err(|err: ChainIntegrityError| self.escalate(LedgerError::from(err).into()))
    }

    #[must_use]
    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            config_hash: self.calibration.set().hash().to_string(),
            calibration_cache: self.calibration.cache_stats(),
            resources: self.resources.status(),
            ledger_records: self.evidence.len(),
            ledger_halted: self.evidence.is_halted(),
            halted: self.halted(),
        }
    }
}

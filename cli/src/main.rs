//! verity CLI - inspection and maintenance entry points.
//!
//! Every subcommand is a thin shell over the library crates:
//!
//! ```text
//! check-config  -> CalibrationSet::load            (all violations, non-zero exit)
//! calibrate     -> CalibrationOrchestrator::calibrate
//! verify-ledger -> verity_ledger::verify_file
//! seeds         -> SeedRegistry::seeds_for_context
//! status        -> Runtime::boot + Runtime::status
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use verity_calibration::{CalibrationMode, CalibrationOrchestrator, LayerInputs};
use verity_config::{CalibrationSet, ConfigError};
use verity_ledger::{SeedRegistry, verify_file};
use verity_runtime::{EngineSettings, Runtime};
use verity_types::{CalibrationContext, CalibrationSubject, EnsemblePosition};

#[derive(Debug, Parser)]
#[command(name = "verity", version)]
#[command(about = "Calibrated, resource-aware execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a calibration config directory.
    CheckConfig {
        dir: PathBuf,
    },
    /// Calibrate one method against a config directory.
    Calibrate {
        dir: PathBuf,
        #[arg(long)]
        method: String,
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        dimension: Option<String>,
        #[arg(long)]
        policy_area: Option<String>,
        #[arg(long)]
        doc_type: Option<String>,
        /// Zero-based position in the ensemble.
        #[arg(long, default_value_t = 0)]
        position: usize,
        #[arg(long, default_value_t = 1)]
        ensemble_size: usize,
        /// JSON file with layer observations.
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// Fall back to the observation's role hint for unregistered methods.
        #[arg(long)]
        lenient: bool,
    },
    /// Recompute every hash of an evidence ledger file.
    VerifyLedger {
        path: PathBuf,
    },
    /// Print the standard seeds for one execution context.
    Seeds {
        policy_unit: String,
        correlation: String,
        /// Derive a single component instead of the standard set.
        #[arg(long)]
        component: Option<String>,
    },
    /// Boot the runtime and print pressure, breakers, cache and ledger state.
    Status {
        /// Engine settings file; defaults to $VERITY_CONFIG or ~/.verity/engine.toml.
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{json}");
    Ok(())
}

fn load_set(dir: &Path) -> Result<CalibrationSet> {
    match CalibrationSet::load(dir) {
        Ok(set) => Ok(set),
        Err(err @ ConfigError::Invalid { .. }) => {
            for violation in err.violations() {
                eprintln!("  - {violation}");
            }
            Err(err).with_context(|| format!("invalid calibration config in {}", dir.display()))
        }
        Err(err) => Err(err).with_context(|| format!("failed to load {}", dir.display())),
    }
}

#[derive(Serialize)]
struct ConfigSummary<'a> {
    dir: &'a Path,
    config_hash: String,
    roles: usize,
    calibrated_methods: usize,
    signatures: usize,
}

fn check_config(dir: &Path) -> Result<()> {
    let set = load_set(dir)?;
    print_json(&ConfigSummary {
        dir,
        config_hash: set.hash().to_string(),
        roles: set.roles().count(),
        calibrated_methods: set.registry().len(),
        signatures: set.catalog().len(),
    })
}

fn calibrate(
    dir: &Path,
    method: String,
    context: CalibrationContext,
    position: usize,
    ensemble_size: usize,
    inputs: Option<&Path>,
    lenient: bool,
) -> Result<()> {
    let set = Arc::new(load_set(dir)?);
    let mode = if lenient {
        CalibrationMode::Lenient
    } else {
        CalibrationMode::Strict
    };
    let orchestrator = CalibrationOrchestrator::with_catalog(set, mode);

    let inputs: LayerInputs = match inputs {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid layer observations in {}", path.display()))?
        }
        None => LayerInputs::default(),
    };
    let position = EnsemblePosition::new(position, ensemble_size)?;
    let subject = CalibrationSubject::new(method, context, position);

    let result = orchestrator.calibrate(&subject, &inputs)?;
    print_json(&*result)
}

#[derive(Serialize)]
struct LedgerSummary<'a> {
    path: &'a Path,
    records: usize,
    verified: bool,
}

fn verify_ledger(path: &Path) -> Result<()> {
    let records = verify_file(path)
        .with_context(|| format!("ledger {} failed verification", path.display()))?;
    print_json(&LedgerSummary {
        path,
        records,
        verified: true,
    })
}

fn seeds(policy_unit: &str, correlation: &str, component: Option<&str>) -> Result<()> {
    let registry = SeedRegistry::new();
    match component {
        Some(component) => {
            registry.get_seed(policy_unit, correlation, component);
        }
        None => {
            registry.seeds_for_context(policy_unit, correlation);
        }
    }
    print_json(&registry.manifest_entry(Some(policy_unit), Some(correlation)))
}

fn status(settings_path: Option<&Path>) -> Result<()> {
    let settings = match settings_path {
        Some(path) => EngineSettings::load_from(path)?,
        None => EngineSettings::load()?.unwrap_or_default(),
    };
    let runtime = Runtime::boot(settings).context("failed to boot runtime")?;
    let status = runtime.status();
    print_json(&status)?;
    if let Some(reason) = status.halted {
        bail!("runtime halted: {reason}");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig { dir } => check_config(&dir),
        Command::Calibrate {
            dir,
            method,
            question,
            dimension,
            policy_area,
            doc_type,
            position,
            ensemble_size,
            inputs,
            lenient,
        } => {
            let context = CalibrationContext {
                question,
                dimension,
                policy_area,
                doc_type,
            };
            calibrate(
                &dir,
                method,
                context,
                position,
                ensemble_size,
                inputs.as_deref(),
                lenient,
            )
        }
        Command::VerifyLedger { path } => verify_ledger(&path),
        Command::Seeds {
            policy_unit,
            correlation,
            component,
        } => seeds(&policy_unit, &correlation, component.as_deref()),
        Command::Status { settings } => status(settings.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn calibrate_arguments_parse() {
        let cli = Cli::parse_from([
            "verity",
            "calibrate",
            "demos/calibration",
            "--method",
            "score.coherence",
            "--question",
            "Q001",
            "--position",
            "1",
            "--ensemble-size",
            "3",
        ]);
        let Command::Calibrate {
            method,
            question,
            position,
            ensemble_size,
            lenient,
            ..
        } = cli.command
        else {
            panic!("expected calibrate");
        };
        assert_eq!(method, "score.coherence");
        assert_eq!(question.as_deref(), Some("Q001"));
        assert_eq!((position, ensemble_size), (1, 3));
        assert!(!lenient);
    }
}

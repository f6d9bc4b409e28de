//! Calibration configuration for verity.
//!
//! A calibration directory holds five TOML files, loaded once at boot:
//!
//! - **`roles.toml`**: per-role linear and interaction weights, required layers
//! - **`intrinsic.toml`**: calibration registry with base-layer sub-scores
//! - **`compatibility.toml`**: method compatibility with questions, dimensions, policy areas
//! - **`meta.toml`**: meta-layer weights, step tables and cost thresholds
//! - **`methods.toml`**: method signatures (declared inputs, fusion strategy)
//!
//! [`CalibrationSet::from_sources`] validates the whole set and either returns an
//! immutable [`CalibrationSet`] or every [`Violation`] found. Range and set values
//! inside the files go through the [`descriptor`] grammar.

pub mod catalog;
pub mod compatibility;
pub mod descriptor;
pub mod meta;
pub mod registry;
pub mod roles;
mod set;
mod violation;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use catalog::MethodCatalog;
pub use compatibility::{Compatibility, CompatibilityTable, MethodCompatibility};
pub use descriptor::{Descriptor, DescriptorError, RangeDescriptor, SetDescriptor};
pub use meta::{CostPolicy, MetaConfig, MetaSteps, MetaWeights, StepTable};
pub use registry::{BaseWeights, CalibrationEntry, CalibrationRegistry, EntrySource, ResolvedEntry};
pub use roles::{InteractionWeight, LayerPair, RoleConfig, WEIGHT_SUM_TOLERANCE};
pub use set::{CONFIG_FILES, CalibrationSet, ConfigHash, ConfigSources};
pub use violation::Violation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("required calibration file {file} is missing")]
    Missing { file: String },
    #[error("calibration config rejected with {} violation(s)", violations.len())]
    Invalid { violations: Vec<Violation> },
}

impl ConfigError {
    /// Every violation when the set was rejected on content, empty otherwise.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Invalid { violations } => violations,
            _ => &[],
        }
    }
}

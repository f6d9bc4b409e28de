//! Engine settings (`engine.toml`).
//!
//! Looked up at `$VERITY_CONFIG`, falling back to `~/.verity/engine.toml`.
//! Every section is optional:
//!
//! ```toml
//! [calibration]
//! dir = "calibration"
//! mode = "strict"
//!
//! [resources]
//! base_timeout_secs = 120
//!
//! [[resources.policies]]
//! executor_id = "extract.entities"
//! priority = "high"
//!
//! [alerts]
//! suppression_secs = 60
//!
//! [ledger]
//! path = "evidence.json"
//! ```
//!
//! Relative paths are resolved against the directory holding the settings file.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verity_calibration::CalibrationMode;
use verity_resources::{AlertConfig, ManagerConfig};
use verity_utils::{AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "VERITY_CONFIG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl SettingsError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            SettingsError::Read { path, .. } | SettingsError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationSettings {
    /// Directory holding the calibration TOML files.
    pub dir: PathBuf,
    pub mode: CalibrationMode,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("calibration"),
            mode: CalibrationMode::Strict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSettings {
    /// Ledger file. Unset keeps evidence in memory only.
    pub path: Option<PathBuf>,
    pub fsync: bool,
    /// Restrict the ledger file to its owner (0o600 on Unix).
    pub owner_only: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: None,
            fsync: true,
            owner_only: false,
        }
    }
}

impl LedgerSettings {
    #[must_use]
    pub fn write_options(&self) -> AtomicWriteOptions {
        let (file_sync, parent_dir_sync) = if self.fsync {
            (FileSyncPolicy::SyncAll, ParentDirSyncPolicy::SyncBestEffort)
        } else {
            (FileSyncPolicy::SkipSync, ParentDirSyncPolicy::SkipSync)
        };
        AtomicWriteOptions {
            file_sync,
            parent_dir_sync,
            mode: if self.owner_only {
                PersistMode::OwnerOnly
            } else {
                PersistMode::Default
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub calibration: CalibrationSettings,
    pub resources: ManagerConfig,
    pub alerts: AlertConfig,
    pub ledger: LedgerSettings,
}

impl EngineSettings {
    /// Loads the settings file if one exists. `Ok(None)` when there is none.
    pub fn load() -> Result<Option<Self>, SettingsError> {
        let Some(path) = settings_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No engine settings file, using defaults");
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to read engine settings: {source}");
            SettingsError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let mut settings: Self = toml::from_str(&content).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to parse engine settings: {source}");
            SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if let Some(base) = path.parent() {
            settings.resolve_relative(base);
        }
        Ok(settings)
    }

    /// Anchors relative paths at `base`.
    pub fn resolve_relative(&mut self, base: &Path) {
        if self.calibration.dir.is_relative() {
            self.calibration.dir = base.join(&self.calibration.dir);
        }
        if let Some(path) = &self.ledger.path
            && path.is_relative()
        {
            self.ledger.path = Some(base.join(path));
        }
    }
}

/// `$VERITY_CONFIG`, else `~/.verity/engine.toml`.
#[must_use]
pub fn settings_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".verity").join("engine.toml"))
}

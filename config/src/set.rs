//! Loading, validating and hashing a calibration config directory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use verity_types::MethodRole;
use verity_utils::hex_encode;

use crate::ConfigError;
use crate::catalog::{self, MethodCatalog, build_catalog};
use crate::compatibility::{self, CompatibilityTable, build_compatibility};
use crate::meta::{MetaConfig, check_meta};
use crate::registry::{self, CalibrationRegistry, build_registry};
use crate::roles::{self, RoleConfig, build_roles};
use crate::violation::{Violation, Violations};

pub(crate) const META_FILE: &str = "meta.toml";

/// Files read from a calibration directory. The first two are mandatory.
pub const CONFIG_FILES: [&str; 5] = [
    roles::FILE,
    registry::FILE,
    compatibility::FILE,
    META_FILE,
    catalog::FILE,
];
const REQUIRED_FILES: [&str; 2] = [roles::FILE, registry::FILE];

/// SHA-256 over every loaded file, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConfigHash(String);

impl ConfigHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw file contents keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    files: BTreeMap<String, String>,
}

impl ConfigSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, content: impl Into<String>) -> Self {
        self.files.insert(name.to_string(), content.into());
        self
    }

    /// Reads every known config file present in `dir`.
    pub fn read_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut sources = Self::new();
        for name in CONFIG_FILES {
            let path = dir.join(name);
            match fs::read_to_string(&path) {
                Ok(content) => {
                    sources.files.insert(name.to_string(), content);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound && !REQUIRED_FILES.contains(&name) => {
                    tracing::debug!(path = %path.display(), "Optional calibration file absent, using defaults");
                }
                Err(source) => return Err(ConfigError::Read { path, source }),
            }
        }
        Ok(sources)
    }

    /// Hash of `name \0 len \0 content` for each file in name order.
    #[must_use]
    pub fn content_hash(&self) -> ConfigHash {
        let mut hasher = Sha256::new();
        for (name, content) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update((content.len() as u64).to_be_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
        }
        ConfigHash(hex_encode(&hasher.finalize()))
    }

    fn parse<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, ConfigError> {
        match self.files.get(name) {
            Some(content) => toml::from_str(content).map_err(|source| ConfigError::Parse {
                file: name.to_string(),
                source,
            }),
            None if REQUIRED_FILES.contains(&name) => Err(ConfigError::Missing {
                file: name.to_string(),
            }),
            None => Ok(T::default()),
        }
    }
}

/// A fully validated calibration config, immutable after boot.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    roles: BTreeMap<MethodRole, RoleConfig>,
    registry: CalibrationRegistry,
    compatibility: CompatibilityTable,
    meta: MetaConfig,
    catalog: MethodCatalog,
    hash: ConfigHash,
}

impl CalibrationSet {
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let sources = ConfigSources::read_dir(dir)?;
        let set = Self::from_sources(&sources)?;
        tracing::info!(
            dir = %dir.display(),
            config_hash = set.hash.short(),
            roles = set.roles.len(),
            methods = set.registry.len(),
            "Loaded calibration config"
        );
        Ok(set)
    }

    /// Parses and validates every file, returning all violations together.
    pub fn from_sources(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let mut violations = Violations::default();

        let roles = build_roles(sources.parse(roles::FILE)?, &mut violations);
        let registry = build_registry(sources.parse(registry::FILE)?, &mut violations);
        let compatibility =
            build_compatibility(sources.parse(compatibility::FILE)?, &mut violations);
        let meta: MetaConfig = sources.parse(META_FILE)?;
        check_meta(&meta, &mut violations);
        let catalog = build_catalog(sources.parse(catalog::FILE)?, &mut violations);

        for entry in registry.entries() {
            if !roles.contains_key(&entry.role) {
                violations.push(Violation::MissingRoleConfig {
                    method_id: entry.method_id.clone(),
                    role: entry.role,
                });
            }
        }

        if !violations.is_empty() {
            return Err(ConfigError::Invalid {
                violations: violations.into_vec(),
            });
        }

        Ok(Self {
            roles,
            registry,
            compatibility,
            meta,
            catalog,
            hash: sources.content_hash(),
        })
    }

    #[must_use]
    pub fn role(&self, role: MethodRole) -> Option<&RoleConfig> {
        self.roles.get(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleConfig> {
        self.roles.values()
    }

    #[must_use]
    pub const fn registry(&self) -> &CalibrationRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn compatibility(&self) -> &CompatibilityTable {
        &self.compatibility
    }

    #[must_use]
    pub const fn meta(&self) -> &MetaConfig {
        &self.meta
    }

    #[must_use]
    pub const fn catalog(&self) -> &MethodCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn hash(&self) -> &ConfigHash {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use verity_types::MethodRole;

    use super::{CalibrationSet, ConfigSources};
    use crate::ConfigError;
    use crate::violation::Violation;

    const ROLES: &str = r#"
        [roles.transform.linear]
        "@b" = 0.5
        "@chain" = 0.3
        "@m" = 0.2
    "#;

    const INTRINSIC: &str = r#"
        [methods."normalize.text"]
        role = "transform"
        theory = 0.8
        implementation = 0.7
        deployment = 0.9
    "#;

    #[test]
    fn minimal_set_loads_with_defaults() {
        let sources = ConfigSources::new()
            .with("roles.toml", ROLES)
            .with("intrinsic.toml", INTRINSIC);
        let set = CalibrationSet::from_sources(&sources).unwrap();
        assert!(set.role(MethodRole::Transform).is_some());
        assert_eq!(set.meta().weights.transparency, 0.5);
        assert_eq!(set.hash().as_str().len(), 64);
    }

    #[test]
    fn hash_changes_with_any_file_content() {
        let a = ConfigSources::new()
            .with("roles.toml", ROLES)
            .with("intrinsic.toml", INTRINSIC);
        let b = a.clone().with("meta.toml", "");
        let c = ConfigSources::new()
            .with("roles.toml", ROLES)
            .with("intrinsic.toml", INTRINSIC.replace("0.9", "0.6"));
        assert_eq!(a.content_hash(), a.clone().content_hash());
        assert_ne!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn violations_from_every_file_are_collected() {
        let sources = ConfigSources::new()
            .with(
                "roles.toml",
                r#"
                [roles.transform.linear]
                "@b" = 0.9
                "@chain" = 0.3
                "@m" = 0.2
                "#,
            )
            .with(
                "intrinsic.toml",
                r#"
                [methods.x]
                role = "report"
                theory = 0.1
                implementation = 0.1
                deployment = 0.1
                "#,
            )
            .with("compatibility.toml", "undeclared = 1.5");
        let Err(ConfigError::Invalid { violations }) = CalibrationSet::from_sources(&sources)
        else {
            panic!("expected invalid config");
        };
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, Violation::UnbalancedWeights { .. }))
        );
        assert!(violations.contains(&Violation::UndeclaredDefaultTooHigh { value: 1.5 }));
        assert!(violations.contains(&Violation::MissingRoleConfig {
            method_id: "x".to_string(),
            role: MethodRole::Report
        }));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let sources = ConfigSources::new().with("roles.toml", ROLES);
        assert!(matches!(
            CalibrationSet::from_sources(&sources),
            Err(ConfigError::Missing { file }) if file == "intrinsic.toml"
        ));
    }

    #[test]
    fn load_reads_directory_and_skips_optional_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("roles.toml"), ROLES).expect("write roles");
        fs::write(dir.path().join("intrinsic.toml"), INTRINSIC).expect("write intrinsic");
        let set = CalibrationSet::load(dir.path()).unwrap();
        assert!(set.registry().get("normalize.text").is_some());
        assert!(set.catalog().is_empty());

        fs::remove_file(dir.path().join("intrinsic.toml")).expect("remove");
        assert!(matches!(
            CalibrationSet::load(dir.path()),
            Err(ConfigError::Read { .. })
        ));
    }
}

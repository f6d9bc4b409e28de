//! Deterministic seeds for stochastic components.
//!
//! A seed is a pure function of `(policy_unit, correlation, component)`: the
//! first four bytes of `SHA-256("{policy_unit}:{correlation}:{component}")`
//! read big-endian. The registry caches derived seeds and audits every
//! derivation so a run can be replayed from its manifest.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Derivation algorithm tag stored with every record.
pub const SEED_VERSION: &str = "sha256_v1";

/// Components seeded by [`SeedRegistry::seeds_for_context`].
pub const STANDARD_COMPONENTS: [&str; 5] =
    ["numpy", "python", "quantum", "neuromorphic", "meta_learner"];

#[must_use]
pub fn derive_seed(material: &str) -> u32 {
    let digest = Sha256::digest(material.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedRecord {
    pub policy_unit_id: String,
    pub correlation_id: String,
    pub component: String,
    pub seed: u32,
    pub seed_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Seed summary for a verification manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedManifest {
    pub seed_version: String,
    pub seeds_generated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub seeds_by_component: BTreeMap<String, u32>,
}

type SeedKey = (String, String, String);

#[derive(Default)]
struct SeedState {
    cache: HashMap<SeedKey, u32>,
    audit: Vec<SeedRecord>,
}

#[derive(Default)]
pub struct SeedRegistry {
    state: Mutex<SeedState>,
}

impl SeedRegistry {
    #[must_use]
    pub fn new() -> Self {
        tracing::debug!(version = SEED_VERSION, "Seed registry initialized");
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached seed for one component. Cache misses are appended to the audit log.
    pub fn get_seed(&self, policy_unit_id: &str, correlation_id: &str, component: &str) -> u32 {
        let key = (
            policy_unit_id.to_string(),
            correlation_id.to_string(),
            component.to_string(),
        );
        let mut state = self.lock();
        if let Some(seed) = state.cache.get(&key) {
            return *seed;
        }

        let seed = derive_seed(&format!("{policy_unit_id}:{correlation_id}:{component}"));
        state.audit.push(SeedRecord {
            policy_unit_id: key.0.clone(),
            correlation_id: key.1.clone(),
            component: key.2.clone(),
            seed,
            seed_version: SEED_VERSION.to_string(),
            timestamp: Utc::now(),
        });
        state.cache.insert(key, seed);
        tracing::debug!(seed, component, policy_unit_id, correlation_id, "Derived seed");
        seed
    }

    /// Seeds for every standard component of one execution context.
    pub fn seeds_for_context(
        &self,
        policy_unit_id: &str,
        correlation_id: &str,
    ) -> BTreeMap<String, u32> {
        STANDARD_COMPONENTS
            .iter()
            .map(|component| {
                (
                    (*component).to_string(),
                    self.get_seed(policy_unit_id, correlation_id, component),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn audit_log(&self) -> Vec<SeedRecord> {
        self.lock().audit.clone()
    }

    /// Manifest of audited seeds, optionally filtered by policy unit and/or correlation.
    #[must_use]
    pub fn manifest_entry(
        &self,
        policy_unit_id: Option<&str>,
        correlation_id: Option<&str>,
    ) -> SeedManifest {
        let state = self.lock();
        let records: Vec<&SeedRecord> = state
            .audit
            .iter()
            .filter(|r| policy_unit_id.is_none_or(|id| r.policy_unit_id == id))
            .filter(|r| correlation_id.is_none_or(|id| r.correlation_id == id))
            .collect();

        let first = records.first();
        SeedManifest {
            seed_version: SEED_VERSION.to_string(),
            seeds_generated: records.len(),
            policy_unit_id: first.map(|r| r.policy_unit_id.clone()),
            correlation_id: first.map(|r| r.correlation_id.clone()),
            seeds_by_component: records
                .iter()
                .map(|r| (r.component.clone(), r.seed))
                .collect(),
        }
    }

    /// Drops cached seeds. The audit log is kept. Returns the number dropped.
    pub fn clear_cache(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.cache.len();
        state.cache.clear();
        tracing::debug!(dropped, "Seed cache cleared");
        dropped
    }
}

//! Append-only, hash-chained evidence ledger.
//!
//! Each record hashes the canonical encoding (sorted keys, compact) of
//! `{index, timestamp, method_name, evidence, metadata, previous_hash}` with
//! SHA-256. The first record links to [`GENESIS`]. On disk the ledger is one
//! JSON array, rewritten atomically on every append.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use verity_utils::{AtomicWriteOptions, atomic_write_with_options, recover_bak_file, sha256_hex};

use crate::{ChainIntegrityError, LedgerError};

/// `previous_hash` of the first record.
pub const GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub index: u64,
    /// RFC 3339, UTC, microsecond precision. Hashed as stored.
    pub timestamp: String,
    pub method_name: String,
    pub evidence: Vec<String>,
    pub metadata: Map<String, Value>,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl EvidenceRecord {
    /// Builds a record and computes its `entry_hash`.
    #[must_use]
    pub fn create(
        index: u64,
        timestamp: String,
        method_name: &str,
        evidence: Vec<String>,
        metadata: Map<String, Value>,
        previous_hash: &str,
    ) -> Self {
        let mut record = Self {
            index,
            timestamp,
            method_name: method_name.to_string(),
            evidence,
            metadata,
            previous_hash: previous_hash.to_string(),
            entry_hash: String::new(),
        };
        record.entry_hash = record.compute_hash();
        record
    }

    /// SHA-256 of the canonical encoding of every field except `entry_hash`.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let payload = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "method_name": self.method_name,
            "evidence": self.evidence,
            "metadata": self.metadata,
            "previous_hash": self.previous_hash,
        });
        sha256_hex(canonical_json(&payload))
    }
}

/// Compact JSON with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Walks the chain from [`GENESIS`], failing on the first break.
pub fn verify_chain(records: &[EvidenceRecord]) -> Result<(), ChainIntegrityError> {
    let mut previous = GENESIS;
    for (position, record) in records.iter().enumerate() {
        let position = position as u64;
        if record.index != position {
            return Err(ChainIntegrityError::IndexMismatch {
                position,
                found: record.index,
            });
        }
        if record.previous_hash != previous {
            return Err(ChainIntegrityError::BrokenLink {
                index: record.index,
                expected: previous.to_string(),
                found: record.previous_hash.clone(),
            });
        }
        let computed = record.compute_hash();
        if computed != record.entry_hash {
            return Err(ChainIntegrityError::HashMismatch {
                index: record.index,
                computed,
                stored: record.entry_hash.clone(),
            });
        }
        previous = &record.entry_hash;
    }
    Ok(())
}

#[derive(Default)]
struct LedgerState {
    records: Vec<EvidenceRecord>,
    /// Set on the first failed verification; appends are refused from then on.
    halted: Option<u64>,
}

/// The single writer of one evidence chain.
///
/// Every mutation goes through one mutex, so concurrent appends are
/// serialized and the chain stays contiguous.
pub struct EvidenceRegistry {
    path: Option<PathBuf>,
    options: AtomicWriteOptions,
    state: Mutex<LedgerState>,
}

impl EvidenceRegistry {
    /// A ledger that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            options: AtomicWriteOptions::default(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Opens the ledger at `path`, verifying any existing chain.
    ///
    /// A missing file starts an empty ledger. A chain that fails verification
    /// is a fatal [`LedgerError::Chain`].
    pub fn open(path: impl Into<PathBuf>, options: AtomicWriteOptions) -> Result<Self, LedgerError> {
        let path = path.into();
        recover_bak_file(&path);
        let records = if path.exists() {
            let records = read_records(&path)?;
            if let Err(err) = verify_chain(&records) {
                tracing::error!(path = %path.display(), index = err.index(), "Evidence chain failed verification on open: {err}");
                return Err(err.into());
            }
            records
        } else {
            Vec::new()
        };
        tracing::info!(path = %path.display(), records = records.len(), "Opened evidence ledger");
        Ok(Self {
            path: Some(path),
            options,
            state: Mutex::new(LedgerState {
                records,
                halted: None,
            }),
        })
    }

    /// [`Self::open`] with default durability.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        Self::open(path, AtomicWriteOptions::default())
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends a record and, for file-backed ledgers, persists the whole chain
    /// before returning. A failed write leaves the in-memory chain unchanged.
    pub fn append(
        &self,
        method_name: &str,
        evidence: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Result<EvidenceRecord, LedgerError> {
        let mut state = self.lock();
        if let Some(index) = state.halted {
            return Err(LedgerError::Halted { index });
        }

        let previous_hash = state
            .records
            .last()
            .map_or(GENESIS, |r| r.entry_hash.as_str())
            .to_string();
        let record = EvidenceRecord::create(
            state.records.len() as u64,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            method_name,
            evidence,
            metadata,
            &previous_hash,
        );
        state.records.push(record.clone());

        if let Some(path) = &self.path
            && let Err(err) = self.persist(path, &state.records)
        {
            state.records.pop();
            return Err(err);
        }
        tracing::debug!(index = record.index, method = %record.method_name, "Appended evidence record");
        Ok(record)
    }

    /// Rewrites the ledger file with the current chain.
    pub fn save(&self) -> Result<(), LedgerError> {
        let path = self.path.as_ref().ok_or(LedgerError::NoStorage)?;
        let state = self.lock();
        self.persist(path, &state.records)?;
        tracing::info!(path = %path.display(), records = state.records.len(), "Saved evidence ledger");
        Ok(())
    }

    fn persist(&self, path: &Path, records: &[EvidenceRecord]) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec_pretty(records).map_err(LedgerError::Encode)?;
        atomic_write_with_options(path, &bytes, self.options).map_err(|source| {
            LedgerError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Recomputes every hash. The first break halts the ledger for writes.
    pub fn verify(&self) -> Result<(), ChainIntegrityError> {
        let mut state = self.lock();
        match verify_chain(&state.records) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(index = err.index(), "Evidence chain broken, halting ledger: {err}");
                state.halted = Some(err.index());
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.lock().halted.is_some()
    }

    #[must_use]
    pub fn records(&self) -> Vec<EvidenceRecord> {
        self.lock().records.clone()
    }

    #[must_use]
    pub fn records_for_method(&self, method_name: &str) -> Vec<EvidenceRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.method_name == method_name)
            .cloned()
            .collect()
    }

    /// Hash the next record will link to.
    #[must_use]
    pub fn last_hash(&self) -> String {
        self.lock()
            .records
            .last()
            .map_or_else(|| GENESIS.to_string(), |r| r.entry_hash.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}

fn read_records(path: &Path) -> Result<Vec<EvidenceRecord>, LedgerError> {
    let bytes = fs::read(path).map_err(|source| LedgerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| LedgerError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and verifies a ledger file without opening it for writes.
pub fn verify_file(path: &Path) -> Result<usize, LedgerError> {
    if !path.exists() {
        return Err(LedgerError::Read {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
    }
    let records = read_records(path)?;
    verify_chain(&records)?;
    Ok(records.len())
}

//! Reproducibility and tamper evidence for verity.
//!
//! - **`seeds`**: [`SeedRegistry`], SHA-256 seed derivation with an audit log
//! - **`evidence`**: [`EvidenceRegistry`], an append-only SHA-256 hash chain
//!   persisted as one JSON array
//!
//! Both registries are explicit handles; construct once at boot and share by
//! reference.

pub mod evidence;
pub mod seeds;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use evidence::{
    EvidenceRecord, EvidenceRegistry, GENESIS, canonical_json, verify_chain, verify_file,
};
pub use seeds::{
    STANDARD_COMPONENTS, SEED_VERSION, SeedManifest, SeedRecord, SeedRegistry, derive_seed,
};

/// First point at which a stored chain stops verifying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIntegrityError {
    #[error("record at position {position} carries index {found}")]
    IndexMismatch { position: u64, found: u64 },
    #[error("record {index} links to previous hash {found}, expected {expected}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("record {index} hash mismatch: computed {computed}, stored {stored}")]
    HashMismatch {
        index: u64,
        computed: String,
        stored: String,
    },
}

impl ChainIntegrityError {
    /// Index (or position) of the first offending record.
    #[must_use]
    pub const fn index(&self) -> u64 {
        match self {
            ChainIntegrityError::IndexMismatch { position, .. } => *position,
            ChainIntegrityError::BrokenLink { index, .. }
            | ChainIntegrityError::HashMismatch { index, .. } => *index,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to persist ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger {path} is not a JSON array of evidence records: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode ledger: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("evidence chain broken: {0}")]
    Chain(#[from] ChainIntegrityError),
    #[error("ledger halted after a chain break at record {index}; manual resolution required")]
    Halted { index: u64 },
    #[error("ledger has no storage path")]
    NoStorage,
}

impl LedgerError {
    /// Chain breaks halt the ledger; everything else is an IO condition.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Chain(_) | LedgerError::Halted { .. })
    }
}

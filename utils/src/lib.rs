//! Shared infrastructure utilities for verity.
//!
//! Cross-cutting helpers that several crates need but that don't belong in the
//! domain-pure `verity-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`digest`**: SHA-256 hex encoding used by config hashes, cache keys and the ledger

pub mod atomic_write;
pub mod digest;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode, atomic_write,
    atomic_write_with_options, recover_bak_file,
};
pub use digest::{hex_encode, sha256_hex};

//! Lowercase hex encoding of SHA-256 digests.

use std::fmt::Write;

use sha2::{Digest, Sha256};

#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// SHA-256 of `bytes` as 64 lowercase hex characters.
#[must_use]
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    hex_encode(&Sha256::digest(bytes.as_ref()))
}

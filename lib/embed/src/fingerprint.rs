//! Text fingerprints for staleness detection.
//!
//! A fingerprint is a SHA-256 digest over an entity's semantic text fields.
//! It is stored next to the embedding at compute time; the embedding is
//! stale iff the stored fingerprint differs from the current one. Write
//! paths decide re-embedding by field-level comparison, not by comparing
//! fingerprints — the digest only answers "is the stored vector current"
//! cheaply at read time.

use sha2::{Digest, Sha256};

/// Field separator inside the digest input. Keeps ["ab", "c"] distinct
/// from ["a", "bc"].
const FIELD_SEPARATOR: u8 = 0x1f;

/// Digest the semantic text fields of an entity
pub fn fingerprint(fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

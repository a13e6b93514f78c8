//! BLAKE3 content hashing for tamper evidence.
//!
//! Every audit record stores the hash of its serialized patch so that a
//! patch edited in place is detectable when the history is replayed.

use crate::AuditRecord;

/// Compute the BLAKE3 hash of a serialized patch. Returns the hex digest.
pub fn compute_patch_hash(patch_text: &str) -> String {
    blake3::hash(patch_text.as_bytes()).to_hex().to_string()
}

/// Whether a record's stored hash matches its patch.
pub fn verify_record(record: &AuditRecord) -> bool {
    match record.patch.to_text() {
        Ok(text) => compute_patch_hash(&text) == record.patch_hash,
        Err(_) => false,
    }
}

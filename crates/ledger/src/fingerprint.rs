//! Request fingerprints for idempotency keys

use sha2::{Digest, Sha256};

/// SHA-256 over the operation name and its identifying fields.
///
/// Fields are length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn request_fingerprint(operation: &str, fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

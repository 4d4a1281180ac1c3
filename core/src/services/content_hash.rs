// ============================================================================
// Module: core/src/content_hash.rs
// Description: Content-addressed duplicate detection (C2)
// ============================================================================

use sha2::{Digest, Sha256};

/// SHA-256 hash of the raw, pre-optimization upload bytes, hex-encoded.
///
/// Hashing happens before `image_optimizer::optimize` runs so that two
/// uploads of the same source photo hash identically even if one request
/// takes the fast path and another doesn't, spec §4.2.
pub fn hash_upload(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    hex::encode(digest)
}

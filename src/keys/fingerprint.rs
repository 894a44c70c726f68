use sha2::{Digest, Sha256};

use crate::types::Principal;

/// First 8 hex characters of SHA-256 over the principal's key bytes.
pub fn short_fingerprint(principal: &Principal) -> String {
    let digest = Sha256::digest(principal.as_bytes());
    hex::encode(&digest[..4])
}

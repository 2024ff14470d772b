use sha2::{Digest, Sha256};

/// SHA-256 hash of a secret, returned as lowercase hex.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented secret with the configured one by digest, so the
/// comparison does not depend on where the raw strings first differ. An
/// unset (empty) configured secret never matches.
pub fn secrets_match(presented: &str, configured: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    hash_token(presented) == hash_token(configured)
}

//! Cache key discipline. Keys are namespaced and query material is
//! hashed so user text never appears verbatim in the key space.

use sha2::{Digest, Sha256};

/// Key for the mode snapshot published by the reconciliation loop.
pub const MODE_CURRENT_KEY: &str = "mode:current";

/// Short content hash: SHA-256 over the lowercased, trimmed input,
/// truncated to 8 hex chars. Collisions only cost a cache miss.
pub fn hash8(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.trim().to_lowercase().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}

/// Key for a cached intent classification.
pub fn intent_key(query: &str) -> String {
    format!("intent:{}", hash8(query))
}

/// Key for one provider's cached search results.
pub fn search_key(provider: &str, query: &str, location: &str) -> String {
    format!("search:{}:{}:{}", provider, hash8(query), hash8(location))
}

/// Key for a session record.
pub fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

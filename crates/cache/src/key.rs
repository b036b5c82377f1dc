//! Deterministic cache keys.

use sha2::{Digest, Sha256};
use voltwise_core::QueryType;

/// Lowercase, collapse whitespace, and drop trailing punctuation, so that
/// trivially different phrasings of one question share a cache entry.
pub fn normalize_query(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['?', '!', '.'])
        .trim_end()
        .to_string()
}

/// Hex SHA-256 of the query type and normalized query.
///
/// `scope` (a session id) is mixed in when keys must not be shared across
/// sessions.
pub fn cache_key(query_type: QueryType, query: &str, scope: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query_type.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalize_query(query).as_bytes());
    if let Some(scope) = scope {
        hasher.update([0x1f]);
        hasher.update(scope.as_bytes());
    }
    hex::encode(hasher.finalize())
}

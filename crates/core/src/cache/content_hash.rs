//! Content-addressable naming for embedding files.

use std::sync::OnceLock;

use regex::Regex;

/// Number of hex characters kept from the path hash.
pub const SHORT_HASH_LEN: usize = 8;

/// First 8 hex characters of the BLAKE3 hash of a source path.
pub fn short_hash(path: &str) -> String {
    let hex = blake3::hash(path.as_bytes()).to_hex();
    hex[..SHORT_HASH_LEN].to_string()
}

/// `<short hash>.json`, the embedding file name for a source path.
pub fn embedding_file_name(path: &str) -> String {
    format!("{}.json", short_hash(path))
}

pub fn is_valid_cache_file_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-f0-9]{8}\.json$").expect("static pattern"))
        .is_match(name)
}

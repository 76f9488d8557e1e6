//! Deterministic content hashing and chunk-ID derivation (§4.1).
//!
//! All hashes are SHA-256 over UTF-8 bytes, rendered as lowercase hex. The
//! hash of empty or absent content is the empty string, used throughout the
//! sync core as the sentinel for "no content".

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static CHUNK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_chunk_(\d+)$").expect("static chunk-id regex"));

/// Compute the lowercase-hex SHA-256 of `content`.
///
/// Returns the empty string for empty content — the sentinel meaning
/// "no content" used throughout the sync core's change detection.
#[must_use]
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the lowercase-hex SHA-256 of raw bytes.
#[must_use]
pub fn bytes_hash(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Returns `true` if `id` matches the chunk-ID form `{base}_chunk_{n}`.
#[must_use]
pub fn is_chunk_id(id: &str) -> bool {
    CHUNK_ID_RE.is_match(id)
}

/// Strip exactly one trailing `_chunk_<n>` suffix from `id`, if present.
///
/// Double-chunked IDs (e.g. `doc_chunk_0_chunk_0`) are tolerated but only
/// one level is stripped per call — callers that need the true original
/// base should loop while [`is_chunk_id`] still returns `true`.
#[must_use]
pub fn base_id(id: &str) -> String {
    match CHUNK_ID_RE.captures(id) {
        Some(caps) => caps[1].to_owned(),
        None => id.to_owned(),
    }
}

/// Repeatedly strip `_chunk_<n>` suffixes until none remain.
///
/// Used by callers that must recover the true logical document ID from an
/// ID that was defectively re-chunked more than once. Bounded to avoid
/// unbounded work on pathological input.
#[must_use]
pub fn fully_strip_chunk_suffixes(id: &str) -> String {
    const MAX_LEVELS: usize = 16;
    let mut current = id.to_owned();
    for _ in 0..MAX_LEVELS {
        if !is_chunk_id(&current) {
            break;
        }
        current = base_id(&current);
    }
    current
}

/// The chunk index embedded in a chunk ID, if `id` is a valid chunk ID.
#[must_use]
pub fn chunk_index(id: &str) -> Option<u32> {
    CHUNK_ID_RE
        .captures(id)
        .and_then(|caps| caps[2].parse::<u32>().ok())
}

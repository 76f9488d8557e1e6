//! Document chunking and chunk-ID resolution (§4.4).
//!
//! One logical document maps to N≥1 physical chunks. [`chunk_content`]
//! performs the split; [`IdResolver`] expands a logical (base) document ID
//! back into the chunk IDs actually stored in the vector store, via the
//! narrow [`ChunkLookup`] capability so this module stays independent of any
//! particular vector-store client.

use std::collections::HashSet;

use crate::error::Result;
use crate::hash::{base_id, is_chunk_id};

/// Default chunk size, in characters, used when a caller doesn't override it.
pub const DEFAULT_CHUNK_SIZE: usize = 512;
/// Default sliding-window overlap, in characters.
pub const DEFAULT_OVERLAP: usize = 50;

/// Bound on the iterative chunk-probe fallback in [`IdResolver::expand_to_chunk_ids`].
const MAX_CHUNK_PROBE: u32 = 64;

/// Split `text` into chunks of at most `size` characters with `overlap`
/// characters of sliding-window context between consecutive chunks.
///
/// If `text` fits in a single chunk (`text.chars().count() <= size`), returns
/// a single-element vector containing `text` unchanged — callers use this to
/// decide whether the single-chunk ID optimization (§4.1) applies.
#[must_use]
pub fn chunk_content(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_owned()];
    }

    let stride = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Build the chunk ID for chunk `index` of logical document `base`.
///
/// Per §4.1, a single-chunk document keeps the base ID unsuffixed; only
/// multi-chunk documents get the `_chunk_{i}` suffix. Callers pass
/// `total_chunks` to decide which form to use.
#[must_use]
pub fn chunk_id(base: &str, index: usize, total_chunks: usize) -> String {
    if total_chunks <= 1 {
        base.to_owned()
    } else {
        format!("{base}_chunk_{index}")
    }
}

/// Narrow capability needed to resolve a base document ID to its stored
/// chunk IDs: "find every stored ID whose `source_id` metadata equals the
/// given value, within a collection". Implemented by the vector-store
/// gateway; kept here as a trait so the chunking/ID logic has no dependency
/// on any particular store client (§9 — capability interface over
/// "collection-like").
pub trait ChunkLookup {
    /// Return every document ID in `collection` whose metadata `source_id`
    /// field equals `source_id`.
    ///
    /// # Errors
    /// Returns an error if the underlying store call fails.
    fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>>;
}

/// Resolves logical (base) document IDs to the chunk IDs actually present
/// in the vector store.
pub struct IdResolver<'a, L: ChunkLookup> {
    lookup: &'a L,
}

impl<'a, L: ChunkLookup> IdResolver<'a, L> {
    /// Wrap a [`ChunkLookup`] implementation.
    pub const fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Expand `id` to the set of chunk IDs actually stored for it (§4.4).
    ///
    /// 1. If `id` is already a chunk ID, it is returned as-is.
    /// 2. Otherwise, every stored document whose `source_id` metadata equals
    ///    `id` is returned.
    /// 3. If that comes back empty, probe `{id}_chunk_0`, `{id}_chunk_1`, …
    ///    as possible *source IDs* themselves, up to [`MAX_CHUNK_PROBE`] —
    ///    covering documents that were chunked, then the resulting chunk 0
    ///    was itself re-chunked under a new source ID. This never recurses
    ///    unboundedly.
    ///
    /// # Errors
    /// Returns an error if the underlying lookup fails.
    pub fn expand_to_chunk_ids(&self, collection: &str, id: &str) -> Result<Vec<String>> {
        if is_chunk_id(id) {
            return Ok(vec![id.to_owned()]);
        }

        let direct = self.lookup.ids_with_source(collection, id)?;
        if !direct.is_empty() {
            return Ok(direct);
        }

        let mut probed = Vec::new();
        for i in 0..MAX_CHUNK_PROBE {
            let probe_source = format!("{id}_chunk_{i}");
            let found = self.lookup.ids_with_source(collection, &probe_source)?;
            if found.is_empty() {
                break;
            }
            probed.extend(found);
        }
        Ok(probed)
    }

    /// Expand every ID in `ids` and return the set union (order unspecified).
    ///
    /// # Errors
    /// Returns an error if any underlying lookup fails.
    pub fn expand_multiple(&self, collection: &str, ids: &[String]) -> Result<Vec<String>> {
        let mut union = HashSet::new();
        for id in ids {
            for expanded in self.expand_to_chunk_ids(collection, id)? {
                union.insert(expanded);
            }
        }
        Ok(union.into_iter().collect())
    }
}

/// Apply [`base_id`] to every ID in `ids` and deduplicate the result.
#[must_use]
pub fn unique_base_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        let base = base_id(id);
        if seen.insert(base.clone()) {
            out.push(base);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeLookup {
        index: RefCell<HashMap<(String, String), Vec<String>>>,
    }

    impl FakeLookup {
        fn new() -> Self {
            Self {
                index: RefCell::new(HashMap::new()),
            }
        }

        fn insert(&self, collection: &str, source_id: &str, ids: Vec<String>) {
            self.index
                .borrow_mut()
                .insert((collection.to_owned(), source_id.to_owned()), ids);
        }
    }

    impl ChunkLookup for FakeLookup {
        fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>> {
            Ok(self
                .index
                .borrow()
                .get(&(collection.to_owned(), source_id.to_owned()))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[test]
    fn s1_small_document_single_chunk() {
        let chunks = chunk_content("Small doc content", DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunk_id("doc1", 0, chunks.len()), "doc1");
    }

    #[test]
    fn s2_large_document_chunking() {
        let text = "A".repeat(800);
        let chunks = chunk_content(&text, 512, 50);
        assert!(chunks.len() >= 2);
        assert_eq!(chunk_id("doc2", 0, chunks.len()), "doc2_chunk_0");
        assert_eq!(chunk_id("doc2", 1, chunks.len()), "doc2_chunk_1");
    }

    #[test]
    fn s2_expand_to_chunk_ids_returns_all_chunks() {
        let lookup = FakeLookup::new();
        lookup.insert(
            "alpha",
            "doc2",
            vec!["doc2_chunk_0".to_owned(), "doc2_chunk_1".to_owned()],
        );
        let resolver = IdResolver::new(&lookup);
        let mut ids = resolver.expand_to_chunk_ids("alpha", "doc2").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["doc2_chunk_0", "doc2_chunk_1"]);
    }

    #[test]
    fn chunk_id_passthrough_when_already_a_chunk_id() {
        let lookup = FakeLookup::new();
        let resolver = IdResolver::new(&lookup);
        let ids = resolver.expand_to_chunk_ids("alpha", "doc2_chunk_0").unwrap();
        assert_eq!(ids, vec!["doc2_chunk_0"]);
    }

    #[test]
    fn s3_no_double_chunking_on_resync() {
        // A chunk ID re-inserted as-is stays a single, non-nested chunk ID —
        // callers check `is_chunk_id` first and skip re-chunking entirely
        // (enforced in SyncManager's upsert path).
        let id = "doc2_chunk_0";
        assert!(is_chunk_id(id));
        let reinserted = chunk_id(id, 0, 1);
        assert_eq!(reinserted, id);
        assert!(!reinserted.ends_with("_chunk_0_chunk_0"));
    }

    #[test]
    fn probe_fallback_bounded_and_used_when_direct_lookup_empty() {
        let lookup = FakeLookup::new();
        lookup.insert("alpha", "doc_chunk_0", vec!["doc_chunk_0_chunk_0".to_owned()]);
        let resolver = IdResolver::new(&lookup);
        let ids = resolver.expand_to_chunk_ids("alpha", "doc").unwrap();
        assert_eq!(ids, vec!["doc_chunk_0_chunk_0"]);
    }

    #[test]
    fn probe_fallback_terminates_when_nothing_found() {
        let lookup = FakeLookup::new();
        let resolver = IdResolver::new(&lookup);
        let ids = resolver.expand_to_chunk_ids("alpha", "ghost").unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn expand_multiple_is_set_union() {
        let lookup = FakeLookup::new();
        lookup.insert("alpha", "doc1", vec!["doc1".to_owned()]);
        lookup.insert(
            "alpha",
            "doc2",
            vec!["doc2_chunk_0".to_owned(), "doc2_chunk_1".to_owned()],
        );
        let resolver = IdResolver::new(&lookup);
        let mut ids = resolver
            .expand_multiple(
                "alpha",
                &["doc1".to_owned(), "doc2".to_owned(), "doc1".to_owned()],
            )
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["doc1", "doc2_chunk_0", "doc2_chunk_1"]);
    }

    #[test]
    fn unique_base_ids_dedupes() {
        let ids = vec![
            "doc2_chunk_0".to_owned(),
            "doc2_chunk_1".to_owned(),
            "doc1".to_owned(),
        ];
        let mut bases = unique_base_ids(&ids);
        bases.sort();
        assert_eq!(bases, vec!["doc1", "doc2"]);
    }
}

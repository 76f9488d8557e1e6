//! Narrow capability interfaces the VCS and vector-store gateways implement
//! (§9 — capability interfaces over "collection-like"/"VCS-like").
//!
//! [`crate::sync::SyncManager`], [`crate::detect::ChangeDetector`] and the
//! rest of this crate never depend on `dmms-dolt` or `dmms-chroma` directly:
//! they depend on these traits, which the gateway crates implement against
//! their concrete clients. This keeps the domain logic testable with fakes
//! and keeps the dependency arrow pointing from the gateways inward, not the
//! other way around.

use crate::chunk::ChunkLookup;
use crate::error::Result;
use crate::model::Document;

/// What the sync core needs from the Dolt side of the world.
///
/// Implemented in `dmms-dolt` by shelling out to the `dolt` CLI per command
/// (no Dolt client library is used as a dependency; see that crate's
/// `DESIGN.md` entry).
pub trait DoltGateway {
    /// Return the current commit hash `branch` is at.
    ///
    /// # Errors
    /// Returns an error if the branch does not exist or the command fails.
    fn current_commit(&self, branch: &str) -> Result<String>;

    /// Check out `branch`, creating it from the current HEAD if it does not
    /// already exist.
    ///
    /// # Errors
    /// Returns an error if the checkout fails.
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Read every document currently stored in `collection` on `branch`.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    fn read_documents(&self, collection: &str, branch: &str) -> Result<Vec<Document>>;

    /// Write (insert or update) one document in `collection` on `branch`.
    /// Does not commit.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn write_document(&self, collection: &str, branch: &str, doc: &Document) -> Result<()>;

    /// Delete one document from `collection` on `branch`. Does not commit.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    fn delete_document(&self, collection: &str, branch: &str, doc_id: &str) -> Result<()>;

    /// Commit the working set on `branch` with `message`, returning the new
    /// commit hash. Returns `Ok` with the unchanged current commit hash (a
    /// no-op) if there is nothing staged.
    ///
    /// # Errors
    /// Returns an error if the commit command fails for any other reason.
    fn commit(&self, branch: &str, message: &str) -> Result<String>;

    /// Find the merge-base commit of two branches, if they share history.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    fn merge_base(&self, branch_a: &str, branch_b: &str) -> Result<Option<String>>;

    /// Rename `collection` to `new_name` on `branch`, carrying its documents
    /// with it. Does not commit.
    ///
    /// # Errors
    /// Returns an error if the rename fails (e.g. `new_name` already exists).
    fn rename_collection(&self, collection: &str, new_name: &str, branch: &str) -> Result<()>;

    /// Drop `collection`'s document table on `branch`, cascading over every
    /// document it holds. A no-op if the table does not exist. Does not
    /// commit.
    ///
    /// # Errors
    /// Returns an error if the drop fails.
    fn drop_collection(&self, collection: &str, branch: &str) -> Result<()>;
}

/// What the sync core needs from the Chroma side of the world.
///
/// Extends [`ChunkLookup`] since chunk-ID resolution is itself a vector-store
/// read. Implemented in `dmms-chroma` against either the persistent
/// (embedded) client or the HTTP client.
pub trait ChromaGateway: ChunkLookup {
    /// Upsert `doc` into `collection`, chunking it per `chunk_size`/`overlap`
    /// (§4.4), and return the chunk IDs written (a single, unsuffixed ID for
    /// a document that fits in one chunk).
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn upsert_document(
        &self,
        collection: &str,
        doc: &Document,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>>;

    /// Delete every chunk belonging to the logical document `base_id` from
    /// `collection`.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    fn delete_document(&self, collection: &str, base_id: &str) -> Result<()>;

    /// Reassemble the logical document `doc_id` (base or chunk ID) from its
    /// stored chunks, or `None` if it is not present.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    fn fetch_document(&self, collection: &str, doc_id: &str) -> Result<Option<Document>>;

    /// List every document currently stored in `collection` as
    /// `(base_doc_id, content_hash)` pairs, one entry per logical document
    /// (chunks of the same document are collapsed to a single entry keyed by
    /// their shared `source_id`).
    ///
    /// # Errors
    /// Returns an error if the read fails.
    fn list_documents(&self, collection: &str) -> Result<Vec<(String, String)>>;
}

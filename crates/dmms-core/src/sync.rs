//! Orchestrates keeping the vector store and the VCS in agreement (§4.6).
//!
//! Two directions, never run concurrently against the same `(repo, branch)`
//! (enforced by the caller holding that repository's mutex — see §5):
//!
//! - **local to VCS**: drain the pending-op log, write each operation to
//!   Dolt's working set, commit once, then mark every drained row
//!   `Committed` and advance the sync-state row's commit hash.
//! - **VCS to local**: read a branch's current document set from Dolt,
//!   diff it against what's recorded in the vector store via
//!   [`crate::detect::ChangeDetector`], and apply the minimal set of
//!   upserts/deletes needed to make the vector store agree.
//!
//! A failure partway through local-to-VCS leaves the affected rows `Staged`
//! rather than `Committed` — the next sync pass picks them up again instead
//! of silently losing them (§7).

use std::collections::HashMap;

use crate::chunk::{chunk_content, chunk_id, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::detect::{ChangeDetector, ChangeKind};
use crate::error::Result;
use crate::gateway::{ChromaGateway, DoltGateway};
use crate::model::{CollectionOpType, Document, Metadata, OpStatus, SyncState, SyncStatus, COLLECTIONS_TABLE};
use crate::store::{PendingOpStore, SyncStateStore};

/// Summary of one local-to-VCS sync pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Number of document operations committed.
    pub doc_ops_committed: usize,
    /// Number of collection operations committed.
    pub collection_ops_committed: usize,
    /// The resulting commit hash, if anything was committed.
    pub commit_hash: Option<String>,
}

/// Summary of one VCS-to-local sync pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Documents upserted into the vector store.
    pub upserted: usize,
    /// Documents deleted from the vector store.
    pub deleted: usize,
    /// Documents that were already identical and required no write.
    pub unchanged: usize,
}

/// Coordinates [`PendingOpStore`], [`SyncStateStore`], and the two gateway
/// traits to keep one repository's Dolt and Chroma stores in agreement.
///
/// Generic over the gateway implementations so the orchestration logic can
/// be exercised with fakes, independent of any real Dolt process or Chroma
/// client.
pub struct SyncManager<'a, D: DoltGateway, C: ChromaGateway> {
    dolt: &'a D,
    chroma: &'a C,
    pending: &'a PendingOpStore,
    sync_state: &'a SyncStateStore,
}

impl<'a, D: DoltGateway, C: ChromaGateway> SyncManager<'a, D, C> {
    /// Wire a [`SyncManager`] to its gateways and stores.
    pub const fn new(
        dolt: &'a D,
        chroma: &'a C,
        pending: &'a PendingOpStore,
        sync_state: &'a SyncStateStore,
    ) -> Self {
        Self {
            dolt,
            chroma,
            pending,
            sync_state,
        }
    }

    /// Drain every `Pending` document and collection operation for
    /// `(repo, branch)` into Dolt's working set and commit them as one
    /// commit.
    ///
    /// Returns a zeroed [`PushSummary`] (no commit hash) if there was
    /// nothing pending — committing nothing is a no-op, not an error.
    ///
    /// # Errors
    /// Returns an error if any write or the commit itself fails. Rows
    /// successfully staged before a failure remain `Staged` (not rolled
    /// back) so a retry doesn't redo work Dolt has already accepted.
    pub fn push_local_to_vcs(&self, repo: &str, branch: &str) -> Result<PushSummary> {
        let doc_ops = self.pending.list_doc_ops(repo, branch, Some(OpStatus::Pending))?;
        let collection_ops = self
            .pending
            .list_collection_ops(repo, branch, Some(OpStatus::Pending))?;

        if doc_ops.is_empty() && collection_ops.is_empty() {
            return Ok(PushSummary::default());
        }

        self.dolt.checkout(branch)?;

        for op in &doc_ops {
            match self.chroma.fetch_document(&op.collection, &op.doc_id)? {
                Some(doc) => self.dolt.write_document(&op.collection, branch, &doc)?,
                None => self.dolt.delete_document(&op.collection, branch, &op.doc_id)?,
            }
            self.pending.set_doc_op_status(op.id, OpStatus::Staged)?;
        }
        // Rename precedes metadata update when both apply to the same
        // collection; a single `PendingCollectionOp` row already carries
        // both (see `PendingOpStore::track_collection_update`), so each row
        // is applied as one atomic cascade rather than two passes.
        for op in &collection_ops {
            match op.operation_type {
                CollectionOpType::Rename => {
                    let new_name = op
                        .new_name
                        .as_deref()
                        .expect("Rename op always carries new_name, see track_collection_update");
                    self.dolt.rename_collection(&op.collection_name, new_name, branch)?;
                    self.dolt.delete_document(COLLECTIONS_TABLE, branch, &op.collection_name)?;
                    self.dolt.write_document(
                        COLLECTIONS_TABLE,
                        branch,
                        &Document::new(new_name, "", op.new_metadata.clone()),
                    )?;
                }
                CollectionOpType::MetadataUpdate => {
                    self.dolt.write_document(
                        COLLECTIONS_TABLE,
                        branch,
                        &Document::new(op.collection_name.clone(), "", op.new_metadata.clone()),
                    )?;
                }
                CollectionOpType::Deletion => {
                    self.dolt.drop_collection(&op.collection_name, branch)?;
                    self.dolt.delete_document(COLLECTIONS_TABLE, branch, &op.collection_name)?;
                }
            }
            self.pending.set_collection_op_status(op.id, OpStatus::Staged)?;
        }

        let commit_hash = self
            .dolt
            .commit(branch, &format!("dmms sync: {} doc op(s)", doc_ops.len()))?;

        for op in &doc_ops {
            self.pending.set_doc_op_status(op.id, OpStatus::Committed)?;
            self.sync_state
                .update_commit_hash(repo, &op.collection, branch, &commit_hash)
                .or_else(|_| {
                    self.sync_state.upsert(&SyncState {
                        repo: repo.to_owned(),
                        collection: op.collection.clone(),
                        branch: branch.to_owned(),
                        last_sync_commit: Some(commit_hash.clone()),
                        doc_count: 0,
                        chunk_count: 0,
                        embedding_model: None,
                        status: SyncStatus::Synced,
                        error_message: None,
                        local_changes_count: 0,
                        updated_at: chrono::Utc::now(),
                    })
                })?;
        }
        for op in &collection_ops {
            self.pending.set_collection_op_status(op.id, OpStatus::Committed)?;
        }
        self.pending.cleanup_committed(repo, branch)?;

        Ok(PushSummary {
            doc_ops_committed: doc_ops.len(),
            collection_ops_committed: collection_ops.len(),
            commit_hash: Some(commit_hash),
        })
    }

    /// Read `collection` on `branch` from Dolt and reconcile the vector
    /// store to match it, writing only the documents that actually changed
    /// (§4.5's hash comparison, not a blind re-index).
    ///
    /// # Errors
    /// Returns an error if the Dolt read, the Chroma read, or any Chroma
    /// write fails.
    pub fn pull_vcs_to_local(&self, repo: &str, collection: &str, branch: &str) -> Result<PullSummary> {
        let vcs_docs = self.dolt.read_documents(collection, branch)?;
        let vcs_by_id: HashMap<String, Document> =
            vcs_docs.into_iter().map(|d| (d.doc_id.clone(), d)).collect();

        let previous: HashMap<String, String> = self
            .chroma
            .list_documents(collection)?
            .into_iter()
            .collect();
        let current: HashMap<String, String> = vcs_by_id
            .iter()
            .map(|(id, doc)| (id.clone(), doc.content_hash.clone()))
            .collect();

        let changes = ChangeDetector::detect_doc_changes(&previous, &current);
        let mut summary = PullSummary::default();

        for change in &changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    let doc = vcs_by_id
                        .get(&change.doc_id)
                        .expect("added/modified doc_id came from `current`, built from vcs_by_id");
                    self.chroma
                        .upsert_document(collection, doc, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)?;
                    summary.upserted += 1;
                }
                ChangeKind::Deleted => {
                    self.chroma.delete_document(collection, &change.doc_id)?;
                    summary.deleted += 1;
                }
            }
        }
        summary.unchanged = current.len() - summary.upserted.min(current.len());

        let commit_hash = self.dolt.current_commit(branch)?;
        self.sync_state.upsert(&SyncState {
            repo: repo.to_owned(),
            collection: collection.to_owned(),
            branch: branch.to_owned(),
            last_sync_commit: Some(commit_hash),
            doc_count: vcs_by_id.len() as u64,
            chunk_count: vcs_by_id
                .values()
                .map(|d| chunk_content(&d.content, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP).len() as u64)
                .sum(),
            embedding_model: None,
            status: SyncStatus::Synced,
            error_message: None,
            local_changes_count: 0,
            updated_at: chrono::Utc::now(),
        })?;

        Ok(summary)
    }
}

/// Given a base document ID and its full content, compute the chunk IDs it
/// would be stored under — used by callers deciding whether a re-sync would
/// double-chunk an already-chunked document (§4.1/§4.4, scenario S3).
#[must_use]
pub fn planned_chunk_ids(base_id: &str, content: &str) -> Vec<String> {
    let chunks = chunk_content(content, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP);
    (0..chunks.len())
        .map(|i| chunk_id(base_id, i, chunks.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    struct FakeDolt {
        commit: RefCell<String>,
        docs: RefCell<HashMap<String, Vec<Document>>>,
    }

    impl FakeDolt {
        fn new() -> Self {
            Self {
                commit: RefCell::new("c0".to_owned()),
                docs: RefCell::new(HashMap::new()),
            }
        }
    }

    impl DoltGateway for FakeDolt {
        fn current_commit(&self, _branch: &str) -> Result<String> {
            Ok(self.commit.borrow().clone())
        }
        fn checkout(&self, _branch: &str) -> Result<()> {
            Ok(())
        }
        fn read_documents(&self, collection: &str, _branch: &str) -> Result<Vec<Document>> {
            Ok(self.docs.borrow().get(collection).cloned().unwrap_or_default())
        }
        fn write_document(&self, collection: &str, _branch: &str, doc: &Document) -> Result<()> {
            let mut docs = self.docs.borrow_mut();
            let entry = docs.entry(collection.to_owned()).or_default();
            entry.retain(|d| d.doc_id != doc.doc_id);
            entry.push(doc.clone());
            Ok(())
        }
        fn delete_document(&self, collection: &str, _branch: &str, doc_id: &str) -> Result<()> {
            if let Some(entry) = self.docs.borrow_mut().get_mut(collection) {
                entry.retain(|d| d.doc_id != doc_id);
            }
            Ok(())
        }
        fn commit(&self, _branch: &str, _message: &str) -> Result<String> {
            let mut commit = self.commit.borrow_mut();
            *commit = format!("{}x", *commit);
            Ok(commit.clone())
        }
        fn merge_base(&self, _a: &str, _b: &str) -> Result<Option<String>> {
            Ok(Some("base".to_owned()))
        }
        fn rename_collection(&self, collection: &str, new_name: &str, _branch: &str) -> Result<()> {
            let mut docs = self.docs.borrow_mut();
            if let Some(entry) = docs.remove(collection) {
                docs.insert(new_name.to_owned(), entry);
            }
            Ok(())
        }
        fn drop_collection(&self, collection: &str, _branch: &str) -> Result<()> {
            self.docs.borrow_mut().remove(collection);
            Ok(())
        }
    }

    struct FakeChroma {
        docs: RefCell<Map<String, Map<String, Document>>>,
    }

    impl FakeChroma {
        fn new() -> Self {
            Self {
                docs: RefCell::new(Map::new()),
            }
        }
    }

    impl crate::chunk::ChunkLookup for FakeChroma {
        fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>> {
            Ok(self
                .docs
                .borrow()
                .get(collection)
                .and_then(|c| c.get(source_id))
                .map(|_| vec![source_id.to_owned()])
                .unwrap_or_default())
        }
    }

    impl ChromaGateway for FakeChroma {
        fn upsert_document(
            &self,
            collection: &str,
            doc: &Document,
            _chunk_size: usize,
            _overlap: usize,
        ) -> Result<Vec<String>> {
            self.docs
                .borrow_mut()
                .entry(collection.to_owned())
                .or_default()
                .insert(doc.doc_id.clone(), doc.clone());
            Ok(vec![doc.doc_id.clone()])
        }
        fn delete_document(&self, collection: &str, base_id: &str) -> Result<()> {
            if let Some(c) = self.docs.borrow_mut().get_mut(collection) {
                c.remove(base_id);
            }
            Ok(())
        }
        fn fetch_document(&self, collection: &str, doc_id: &str) -> Result<Option<Document>> {
            Ok(self.docs.borrow().get(collection).and_then(|c| c.get(doc_id)).cloned())
        }
        fn list_documents(&self, collection: &str) -> Result<Vec<(String, String)>> {
            Ok(self
                .docs
                .borrow()
                .get(collection)
                .map(|c| c.values().map(|d| (d.doc_id.clone(), d.content_hash.clone())).collect())
                .unwrap_or_default())
        }
    }

    #[test]
    fn push_with_nothing_pending_is_a_no_op() {
        let dolt = FakeDolt::new();
        let chroma = FakeChroma::new();
        let pending = PendingOpStore::open_in_memory().unwrap();
        let sync_state = SyncStateStore::open_in_memory().unwrap();
        let manager = SyncManager::new(&dolt, &chroma, &pending, &sync_state);
        let summary = manager.push_local_to_vcs("/repo", "main").unwrap();
        assert_eq!(summary, PushSummary::default());
    }

    #[test]
    fn push_commits_pending_doc_ops_once() {
        let dolt = FakeDolt::new();
        let chroma = FakeChroma::new();
        let pending = PendingOpStore::open_in_memory().unwrap();
        let sync_state = SyncStateStore::open_in_memory().unwrap();
        chroma
            .upsert_document("alpha", &Document::new("d1", "hi", Metadata::new()), 512, 50)
            .unwrap();
        pending
            .insert_doc_op("/repo", "d1", "alpha", "oldhash", &Metadata::new(), "main", "c0", "tool")
            .unwrap();

        let manager = SyncManager::new(&dolt, &chroma, &pending, &sync_state);
        let summary = manager.push_local_to_vcs("/repo", "main").unwrap();
        assert_eq!(summary.doc_ops_committed, 1);
        assert!(summary.commit_hash.is_some());
        assert!(pending
            .list_doc_ops("/repo", "main", Some(OpStatus::Pending))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn pull_upserts_added_and_modified_and_deletes_removed() {
        let dolt = FakeDolt::new();
        let chroma = FakeChroma::new();
        let pending = PendingOpStore::open_in_memory().unwrap();
        let sync_state = SyncStateStore::open_in_memory().unwrap();

        chroma
            .upsert_document("alpha", &Document::new("stale", "gone soon", Metadata::new()), 512, 50)
            .unwrap();
        dolt.write_document("alpha", "main", &Document::new("d1", "new content", Metadata::new()))
            .unwrap();

        let manager = SyncManager::new(&dolt, &chroma, &pending, &sync_state);
        let summary = manager.pull_vcs_to_local("/repo", "alpha", "main").unwrap();
        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.deleted, 1);

        let state = sync_state.get("/repo", "alpha", "main").unwrap().unwrap();
        assert_eq!(state.doc_count, 1);
        assert_eq!(state.status, SyncStatus::Synced);
    }

    #[test]
    fn pull_is_idempotent_when_nothing_changed() {
        let dolt = FakeDolt::new();
        let chroma = FakeChroma::new();
        let pending = PendingOpStore::open_in_memory().unwrap();
        let sync_state = SyncStateStore::open_in_memory().unwrap();

        let doc = Document::new("d1", "same", Metadata::new());
        chroma.upsert_document("alpha", &doc, 512, 50).unwrap();
        dolt.write_document("alpha", "main", &doc).unwrap();

        let manager = SyncManager::new(&dolt, &chroma, &pending, &sync_state);
        let summary = manager.pull_vcs_to_local("/repo", "alpha", "main").unwrap();
        assert_eq!(summary.upserted, 0);
        assert_eq!(summary.deleted, 0);
    }

    #[test]
    fn s3_planned_chunk_ids_single_chunk_has_no_suffix() {
        assert_eq!(planned_chunk_ids("doc1", "short"), vec!["doc1".to_owned()]);
    }

    #[test]
    fn s5_collection_rename_and_metadata_update_cascades_on_push() {
        let dolt = FakeDolt::new();
        let chroma = FakeChroma::new();
        let pending = PendingOpStore::open_in_memory().unwrap();
        let sync_state = SyncStateStore::open_in_memory().unwrap();

        dolt.write_document("old", "main", &Document::new("d1", "hi", Metadata::new()))
            .unwrap();

        let mut new_metadata = Metadata::new();
        new_metadata.insert("archived".to_owned(), serde_json::Value::Bool(true));
        pending
            .track_collection_update(
                "/repo",
                "old",
                Some("new"),
                &Metadata::new(),
                &new_metadata,
                "main",
                "c0",
            )
            .unwrap()
            .expect("rename + metadata change is recorded");

        let manager = SyncManager::new(&dolt, &chroma, &pending, &sync_state);
        let summary = manager.push_local_to_vcs("/repo", "main").unwrap();
        assert_eq!(summary.collection_ops_committed, 1);

        assert!(dolt.read_documents("old", "main").unwrap().is_empty());
        assert_eq!(dolt.read_documents("new", "main").unwrap().len(), 1);

        let meta = dolt.read_documents(COLLECTIONS_TABLE, "main").unwrap();
        assert!(meta.iter().all(|d| d.doc_id != "old"));
        let new_meta = meta.iter().find(|d| d.doc_id == "new").expect("renamed meta row present");
        assert_eq!(new_meta.metadata, new_metadata);

        assert!(pending.list_collection_ops("/repo", "main", None).unwrap().is_empty());
    }
}

//! Change detection by content hash comparison, not row count (§4.5).
//!
//! Counting documents/collections can't tell "one doc added, one deleted"
//! from "nothing changed" apart, and can't tell "content changed in place"
//! from "nothing changed" at all. Every comparison here is keyed on the
//! content hash computed by [`crate::hash::content_hash`], so a same-length
//! edit is caught and a no-op re-sync produces zero changes (idempotency,
//! scenario S4).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{CollectionOpType, Metadata, PendingCollectionOp};

/// What kind of change was detected for one document or collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present now, absent before.
    Added,
    /// Present in both, content hash differs.
    Modified,
    /// Present before, absent now.
    Deleted,
    /// Present in both, metadata differs (collections only).
    Updated,
    /// A pending rename is on record for this collection (collections only).
    Renamed,
}

/// A single document-level change detected between two snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocChange {
    /// The document ID affected.
    pub doc_id: String,
    /// What kind of change this is.
    pub kind: ChangeKind,
    /// Content hash before the change, if the document previously existed.
    pub old_hash: Option<String>,
    /// Content hash after the change, if the document now exists.
    pub new_hash: Option<String>,
}

/// A single collection-level change detected between two snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionChange {
    /// The collection name affected (the pre-rename name for `Renamed`).
    pub name: String,
    /// What kind of change this is.
    pub kind: ChangeKind,
    /// The collection's new name, present only for [`ChangeKind::Renamed`].
    pub new_name: Option<String>,
}

/// Detects changes to the document set of a single collection.
///
/// Change detection compares content hashes (§4.5), never counts: the same
/// resulting count can come from "nothing changed" or "one added, one
/// deleted", and only a hash comparison tells them apart.
pub struct ChangeDetector;

impl ChangeDetector {
    /// Compare a previous and current `doc_id -> content_hash` snapshot for
    /// one collection and return every detected change.
    ///
    /// Calling this twice with the same two snapshots always returns the
    /// same result, and calling it with `previous == current` always returns
    /// an empty vector (idempotency, scenario S4).
    #[must_use]
    pub fn detect_doc_changes(
        previous: &HashMap<String, String>,
        current: &HashMap<String, String>,
    ) -> Vec<DocChange> {
        let mut changes = Vec::new();
        let mut seen = HashSet::new();

        for (doc_id, new_hash) in current {
            seen.insert(doc_id.clone());
            match previous.get(doc_id) {
                None => changes.push(DocChange {
                    doc_id: doc_id.clone(),
                    kind: ChangeKind::Added,
                    old_hash: None,
                    new_hash: Some(new_hash.clone()),
                }),
                Some(old_hash) if old_hash != new_hash => changes.push(DocChange {
                    doc_id: doc_id.clone(),
                    kind: ChangeKind::Modified,
                    old_hash: Some(old_hash.clone()),
                    new_hash: Some(new_hash.clone()),
                }),
                Some(_) => {}
            }
        }

        for (doc_id, old_hash) in previous {
            if !seen.contains(doc_id) {
                changes.push(DocChange {
                    doc_id: doc_id.clone(),
                    kind: ChangeKind::Deleted,
                    old_hash: Some(old_hash.clone()),
                    new_hash: None,
                });
            }
        }

        changes.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        changes
    }

    /// Compare a previous and current `name -> metadata` snapshot for one
    /// repository's collections and return every detected change (§4.5):
    /// added, deleted, updated (present in both, metadata differs), and
    /// renamed (pulled from `pending_renames`, as recorded by
    /// [`crate::store::pending_ops::PendingOpStore`] — a rename would
    /// otherwise show up as an unrelated delete-plus-add pair).
    #[must_use]
    pub fn detect_collection_changes(
        previous: &HashMap<String, Metadata>,
        current: &HashMap<String, Metadata>,
        pending_renames: &[PendingCollectionOp],
    ) -> Vec<CollectionChange> {
        let renames: HashMap<&str, &str> = pending_renames
            .iter()
            .filter(|op| op.operation_type == CollectionOpType::Rename)
            .filter_map(|op| op.new_name.as_deref().map(|new_name| (op.collection_name.as_str(), new_name)))
            .filter(|(old_name, _)| previous.contains_key(*old_name))
            .collect();

        let mut handled_old: HashSet<&str> = HashSet::new();
        let mut handled_new: HashSet<&str> = HashSet::new();
        let mut changes = Vec::new();

        for (&old_name, &new_name) in &renames {
            changes.push(CollectionChange {
                name: old_name.to_owned(),
                kind: ChangeKind::Renamed,
                new_name: Some(new_name.to_owned()),
            });
            handled_old.insert(old_name);
            handled_new.insert(new_name);
        }

        for (name, metadata) in current {
            if handled_new.contains(name.as_str()) {
                continue;
            }
            match previous.get(name) {
                None => changes.push(CollectionChange {
                    name: name.clone(),
                    kind: ChangeKind::Added,
                    new_name: None,
                }),
                Some(old_metadata) if old_metadata != metadata => changes.push(CollectionChange {
                    name: name.clone(),
                    kind: ChangeKind::Updated,
                    new_name: None,
                }),
                Some(_) => {}
            }
        }

        for name in previous.keys() {
            if handled_old.contains(name.as_str()) || current.contains_key(name) {
                continue;
            }
            changes.push(CollectionChange {
                name: name.clone(),
                kind: ChangeKind::Deleted,
                new_name: None,
            });
        }

        changes.sort_by(|a, b| a.name.cmp(&b.name));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn s4_no_changes_is_idempotent() {
        let snap = snapshot(&[("doc1", "hash1"), ("doc2", "hash2")]);
        assert!(ChangeDetector::detect_doc_changes(&snap, &snap).is_empty());
    }

    #[test]
    fn detects_added_modified_and_deleted_together() {
        let previous = snapshot(&[("doc1", "h1"), ("doc2", "h2")]);
        let current = snapshot(&[("doc1", "h1-new"), ("doc3", "h3")]);
        let mut changes = ChangeDetector::detect_doc_changes(&previous, &current);
        changes.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].doc_id, "doc1");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[1].doc_id, "doc2");
        assert_eq!(changes[1].kind, ChangeKind::Deleted);
        assert_eq!(changes[2].doc_id, "doc3");
        assert_eq!(changes[2].kind, ChangeKind::Added);
    }

    #[test]
    fn same_count_different_membership_is_not_mistaken_for_no_change() {
        let previous = snapshot(&[("doc1", "h1"), ("doc2", "h2")]);
        let current = snapshot(&[("doc1", "h1"), ("doc3", "h2")]);
        let changes = ChangeDetector::detect_doc_changes(&previous, &current);
        assert_eq!(changes.len(), 2);
    }

    fn collections(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, Metadata> {
        pairs
            .iter()
            .map(|(name, meta)| {
                let mut metadata = Metadata::new();
                metadata.insert("tag".to_owned(), meta.clone());
                ((*name).to_owned(), metadata)
            })
            .collect()
    }

    #[test]
    fn collection_changes_detect_add_and_remove() {
        let previous = collections(&[("alpha", serde_json::json!(1)), ("beta", serde_json::json!(1))]);
        let current = collections(&[("alpha", serde_json::json!(1)), ("gamma", serde_json::json!(1))]);
        let changes = ChangeDetector::detect_collection_changes(&previous, &current, &[]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "beta");
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert_eq!(changes[1].name, "gamma");
        assert_eq!(changes[1].kind, ChangeKind::Added);
    }

    #[test]
    fn collection_changes_idempotent_when_unchanged() {
        let names = collections(&[("alpha", serde_json::json!(1)), ("beta", serde_json::json!(1))]);
        assert!(ChangeDetector::detect_collection_changes(&names, &names, &[]).is_empty());
    }

    #[test]
    fn collection_changes_detect_metadata_update() {
        let previous = collections(&[("alpha", serde_json::json!(1))]);
        let current = collections(&[("alpha", serde_json::json!(2))]);
        let changes = ChangeDetector::detect_collection_changes(&previous, &current, &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "alpha");
        assert_eq!(changes[0].kind, ChangeKind::Updated);
    }

    #[test]
    fn collection_changes_detect_pending_rename_instead_of_delete_add() {
        let previous = collections(&[("alpha", serde_json::json!(1))]);
        let current = collections(&[("alpha_v2", serde_json::json!(1))]);
        let rename_op = PendingCollectionOp {
            id: 1,
            repo: "repo".to_owned(),
            collection_name: "alpha".to_owned(),
            new_name: Some("alpha_v2".to_owned()),
            original_metadata: Metadata::new(),
            new_metadata: Metadata::new(),
            branch: "main".to_owned(),
            base_commit: String::new(),
            operation_type: CollectionOpType::Rename,
            status: crate::model::OpStatus::Pending,
        };
        let changes = ChangeDetector::detect_collection_changes(&previous, &current, &[rename_op]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "alpha");
        assert_eq!(changes[0].kind, ChangeKind::Renamed);
        assert_eq!(changes[0].new_name.as_deref(), Some("alpha_v2"));
    }
}

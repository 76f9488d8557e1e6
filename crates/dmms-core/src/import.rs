//! Cross-repository import, with wildcard source-collection selection and
//! conflict resolution (§4.8, scenarios S7/S8).
//!
//! Importing a set of source collections into one or more target collections
//! can collide three ways: an incoming document can collide with one already
//! present in the target (`imp_` conflicts, classified as content or
//! metadata collisions), the source collection's own metadata can disagree
//! with an existing target's (a collection-level mismatch), or two
//! *different* source collections being imported together can both define
//! the same document ID (`xc_` conflicts, "cross-collection", classified as
//! `IdCollision`). Every kind carries a deterministic ID so a caller can
//! preview conflicts, resolve them, and execute against the same IDs without
//! a race.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{Document, Metadata};
use crate::wildcard::filter_by_pattern;

/// The kind of collision an [`ImportConflict`] represents (§3, §4.8 step 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportConflictType {
    /// Target already holds this document with different content.
    ContentModification,
    /// Target already holds this document with the same content but
    /// different metadata.
    MetadataConflict,
    /// The target collection already exists and its metadata disagrees with
    /// the source collection's.
    CollectionMismatch,
    /// Two or more source collections being imported together both define
    /// this document ID for the same target.
    IdCollision,
}

impl ImportConflictType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ContentModification => "content_modification",
            Self::MetadataConflict => "metadata_conflict",
            Self::CollectionMismatch => "collection_mismatch",
            Self::IdCollision => "id_collision",
        }
    }
}

/// A resolution strategy for an import conflict (§4.8 step 3). Framed as
/// source-vs-target rather than a merge's ours-vs-theirs, since an import
/// has no common ancestor — only an incoming value and, optionally, one
/// already present at the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportResolution {
    /// Keep the incoming (source) value.
    KeepSource,
    /// Keep the value already at the target.
    KeepTarget,
    /// Merge non-overlapping fields where possible.
    Merge,
    /// Leave this conflict unresolved; don't import it.
    Skip,
    /// The caller supplies its own resolved value out of band.
    Custom,
    /// Rename the imported document to `{source_collection}__{doc_id}` so it
    /// no longer collides (`IdCollision` only).
    Namespace,
    /// Among colliding sources, keep the one listed first.
    KeepFirst,
    /// Among colliding sources, keep the one listed last.
    KeepLast,
}

impl ImportResolution {
    /// Whether `self` is a permitted resolution for `conflict_type`, per the
    /// table in §4.8 step 3.
    #[must_use]
    pub const fn allowed_for(self, conflict_type: ImportConflictType) -> bool {
        use ImportConflictType::{CollectionMismatch, ContentModification, IdCollision, MetadataConflict};
        use ImportResolution::{Custom, KeepFirst, KeepLast, KeepSource, KeepTarget, Merge, Namespace, Skip};

        matches!(
            (conflict_type, self),
            (ContentModification, KeepSource | KeepTarget | Merge | Skip | Custom)
                | (MetadataConflict, KeepSource | KeepTarget | Merge | Skip)
                | (CollectionMismatch, KeepSource | KeepTarget | Skip)
                | (IdCollision, Namespace | KeepFirst | KeepLast | Skip)
        )
    }
}

/// A single collision found while importing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportConflict {
    /// Deterministic ID, stable between preview and execute.
    pub conflict_id: String,
    /// The document ID in collision. Empty for a collection-level
    /// [`ImportConflictType::CollectionMismatch`], which has no single
    /// document.
    pub doc_id: String,
    /// The target collection the import is writing into.
    pub target_collection: String,
    /// Source collection(s) contributing a colliding version, sorted for
    /// determinism when more than one is involved.
    pub source_collections: Vec<String>,
    /// Classification of the collision.
    #[serde(rename = "type")]
    pub conflict_type: ImportConflictType,
    /// `true` if this is a collision against something already present in
    /// the target (as opposed to two sources colliding with each other).
    pub against_existing_target: bool,
}

/// Compute the deterministic ID for an import conflict against an existing
/// target (`imp_` prefix): `imp_` + 12 hex chars of
/// `SHA-256(source|target|doc_id|type)` (§3).
#[must_use]
pub fn import_conflict_id(
    source_collection: &str,
    target_collection: &str,
    doc_id: &str,
    conflict_type: ImportConflictType,
) -> String {
    let input = format!("{source_collection}|{target_collection}|{doc_id}|{}", conflict_type.as_str());
    let digest = Sha256::digest(input.as_bytes());
    format!("imp_{}", &hex::encode(digest)[..12])
}

/// Compute the deterministic ID for a cross-collection conflict between two
/// or more sources being imported together (`xc_` prefix). Source names are
/// sorted before hashing so the ID doesn't depend on import order.
#[must_use]
pub fn cross_collection_conflict_id(
    target_collection: &str,
    doc_id: &str,
    source_collections: &[String],
) -> String {
    let mut sorted = source_collections.to_vec();
    sorted.sort();
    let input = format!("{target_collection}|{doc_id}|{}", sorted.join(","));
    let digest = Sha256::digest(input.as_bytes());
    format!("xc_{}", &hex::encode(digest)[..12])
}

/// One source collection's documents, as read for an import pass.
#[derive(Clone, Debug)]
pub struct ImportBatch {
    /// The source collection's name.
    pub source_collection: String,
    /// The source collection's own metadata, compared against the target's
    /// to detect a [`ImportConflictType::CollectionMismatch`].
    pub metadata: Metadata,
    /// Documents read from that collection.
    pub documents: Vec<Document>,
}

/// Result of [`ImportEngine::preview`].
#[derive(Clone, Debug, Default)]
pub struct ImportPreview {
    /// Documents that can be imported without any collision.
    pub clean: Vec<(String, Document)>,
    /// Every collision found, each carrying a stable ID.
    pub conflicts: Vec<ImportConflict>,
}

/// One element of an import filter list (§4.8 step 1). `name` is a source
/// collection pattern (may contain `*`), `import_into` is the target
/// collection it feeds, and `documents` optionally narrows the import to a
/// list of document-ID patterns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportFilterSpec {
    /// Source collection name or pattern.
    pub name: String,
    /// Target collection this source feeds.
    pub import_into: String,
    /// Optional document-ID patterns narrowing which documents are pulled.
    #[serde(default)]
    pub documents: Option<Vec<String>>,
}

/// One `(source_collection, import_into)` pairing produced by expanding an
/// [`ImportFilterSpec`]'s `name` pattern against the available collections.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedImportMapping {
    /// A concrete source collection name matched by the owning spec.
    pub source_collection: String,
    /// The target collection this source feeds.
    pub import_into: String,
    /// Document-ID patterns inherited from the owning spec, if any.
    pub documents: Option<Vec<String>>,
}

/// Resolves wildcard source-collection filters and previews/executes
/// cross-repository imports (§4.8).
pub struct ImportEngine;

impl ImportEngine {
    /// Expand `specs` (§4.8 step 1, scenario S8). An empty list imports
    /// every available collection into itself. Otherwise, each spec's
    /// `name` pattern is expanded against `available_collections`; two or
    /// more source collections may map to the same `import_into`
    /// (scenario S8's `archive_*` -> `consolidated` alongside `current` ->
    /// `active`), and duplicate `(source, import_into)` mappings are
    /// preserved as distinct entries. Use [`Self::target_collections`] for
    /// the deduplicated set of targets.
    #[must_use]
    pub fn expand_filter_specs(
        available_collections: &[&str],
        specs: &[ImportFilterSpec],
    ) -> Vec<ExpandedImportMapping> {
        if specs.is_empty() {
            return available_collections
                .iter()
                .map(|name| ExpandedImportMapping {
                    source_collection: (*name).to_owned(),
                    import_into: (*name).to_owned(),
                    documents: None,
                })
                .collect();
        }

        specs
            .iter()
            .flat_map(|spec| {
                filter_by_pattern(&spec.name, available_collections)
                    .into_iter()
                    .map(move |source| ExpandedImportMapping {
                        source_collection: source.to_owned(),
                        import_into: spec.import_into.clone(),
                        documents: spec.documents.clone(),
                    })
            })
            .collect()
    }

    /// The distinct `import_into` targets named by `mappings`, deduplicated
    /// in first-seen order (§4.8 step 1).
    #[must_use]
    pub fn target_collections(mappings: &[ExpandedImportMapping]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for mapping in mappings {
            if seen.insert(mapping.import_into.clone()) {
                out.push(mapping.import_into.clone());
            }
        }
        out
    }

    /// Preview importing `batches` into `target_collection`, given the
    /// documents and (if the target already exists) metadata already
    /// present there.
    ///
    /// A source collection whose own metadata disagrees with
    /// `existing_target_metadata` is a `CollectionMismatch`. A document ID
    /// present in more than one batch with disagreeing content is an
    /// `IdCollision` (and, if it also collides with the target, both
    /// conflicts are reported). A document ID present in exactly one batch
    /// is clean unless the target already has it: same content and metadata
    /// is clean (idempotent import), different content is a
    /// `ContentModification`, same content but different metadata is a
    /// `MetadataConflict`.
    #[must_use]
    pub fn preview(
        target_collection: &str,
        batches: &[ImportBatch],
        existing_target_docs: &HashMap<String, Document>,
        existing_target_metadata: Option<&Metadata>,
    ) -> ImportPreview {
        let mut preview = ImportPreview::default();

        if let Some(target_metadata) = existing_target_metadata {
            for batch in batches {
                if &batch.metadata != target_metadata {
                    preview.conflicts.push(ImportConflict {
                        conflict_id: import_conflict_id(
                            &batch.source_collection,
                            target_collection,
                            "",
                            ImportConflictType::CollectionMismatch,
                        ),
                        doc_id: String::new(),
                        target_collection: target_collection.to_owned(),
                        source_collections: vec![batch.source_collection.clone()],
                        conflict_type: ImportConflictType::CollectionMismatch,
                        against_existing_target: true,
                    });
                }
            }
        }

        let mut by_doc_id: HashMap<&str, Vec<(&str, &Document)>> = HashMap::new();
        for batch in batches {
            for doc in &batch.documents {
                by_doc_id
                    .entry(doc.doc_id.as_str())
                    .or_default()
                    .push((batch.source_collection.as_str(), doc));
            }
        }

        for (doc_id, contributors) in by_doc_id {
            let distinct_hashes: HashSet<&str> = contributors.iter().map(|(_, doc)| doc.content_hash.as_str()).collect();
            let source_names: Vec<String> = contributors.iter().map(|(name, _)| (*name).to_owned()).collect();

            if contributors.len() > 1 && distinct_hashes.len() > 1 {
                let mut sorted_sources = source_names.clone();
                sorted_sources.sort();
                preview.conflicts.push(ImportConflict {
                    conflict_id: cross_collection_conflict_id(target_collection, doc_id, &source_names),
                    doc_id: doc_id.to_owned(),
                    target_collection: target_collection.to_owned(),
                    source_collections: sorted_sources,
                    conflict_type: ImportConflictType::IdCollision,
                    against_existing_target: false,
                });
                continue;
            }

            let (source_name, doc) = contributors[0];
            if let Some(existing) = existing_target_docs.get(doc_id) {
                if existing.content_hash != doc.content_hash {
                    preview.conflicts.push(ImportConflict {
                        conflict_id: import_conflict_id(
                            source_name,
                            target_collection,
                            doc_id,
                            ImportConflictType::ContentModification,
                        ),
                        doc_id: doc_id.to_owned(),
                        target_collection: target_collection.to_owned(),
                        source_collections: vec![source_name.to_owned()],
                        conflict_type: ImportConflictType::ContentModification,
                        against_existing_target: true,
                    });
                    continue;
                }
                if existing.metadata != doc.metadata {
                    preview.conflicts.push(ImportConflict {
                        conflict_id: import_conflict_id(
                            source_name,
                            target_collection,
                            doc_id,
                            ImportConflictType::MetadataConflict,
                        ),
                        doc_id: doc_id.to_owned(),
                        target_collection: target_collection.to_owned(),
                        source_collections: vec![source_name.to_owned()],
                        conflict_type: ImportConflictType::MetadataConflict,
                        against_existing_target: true,
                    });
                    continue;
                }
            }

            preview.clean.push((source_name.to_owned(), doc.clone()));
        }

        preview.conflicts.sort_by(|a, b| a.conflict_id.cmp(&b.conflict_id));
        preview
    }

    /// Execute an import given a preview and a map of conflict ID to chosen
    /// [`ImportResolution`]. Conflicts with no entry in `resolutions`, a
    /// resolution not permitted for their type, or a resolution that
    /// produces no document (`Skip`, `Custom`, `Merge`, or a collection-level
    /// `CollectionMismatch`, none of which this engine can materialize on
    /// its own) are left unresolved and returned in `still_unresolved`.
    #[must_use]
    pub fn execute(
        preview: &ImportPreview,
        batches: &[ImportBatch],
        existing_target_docs: &HashMap<String, Document>,
        resolutions: &HashMap<String, ImportResolution>,
    ) -> ImportResult {
        let mut imported = Vec::new();
        let mut still_unresolved = Vec::new();

        for (_, doc) in &preview.clean {
            imported.push(doc.clone());
        }

        for conflict in &preview.conflicts {
            let Some(&resolution) = resolutions.get(&conflict.conflict_id) else {
                still_unresolved.push(conflict.clone());
                continue;
            };
            if !resolution.allowed_for(conflict.conflict_type) {
                still_unresolved.push(conflict.clone());
                continue;
            }
            match resolve_one(conflict, resolution, batches, existing_target_docs) {
                Some(doc) => imported.push(doc),
                None => still_unresolved.push(conflict.clone()),
            }
        }

        ImportResult {
            imported,
            still_unresolved,
        }
    }
}

fn resolve_one(
    conflict: &ImportConflict,
    resolution: ImportResolution,
    batches: &[ImportBatch],
    existing_target_docs: &HashMap<String, Document>,
) -> Option<Document> {
    let incoming = |source: &str| -> Option<Document> {
        batches
            .iter()
            .find(|b| b.source_collection == source)
            .and_then(|b| b.documents.iter().find(|d| d.doc_id == conflict.doc_id))
            .cloned()
    };

    match resolution {
        ImportResolution::KeepTarget => existing_target_docs.get(&conflict.doc_id).cloned(),
        ImportResolution::KeepSource | ImportResolution::KeepFirst => {
            conflict.source_collections.first().and_then(|s| incoming(s))
        }
        ImportResolution::KeepLast => conflict.source_collections.last().and_then(|s| incoming(s)),
        ImportResolution::Namespace => {
            let source = conflict.source_collections.first()?;
            let mut doc = incoming(source)?;
            doc.doc_id = format!("{source}__{}", conflict.doc_id);
            Some(doc)
        }
        ImportResolution::Merge | ImportResolution::Skip | ImportResolution::Custom => None,
    }
}

/// Outcome of [`ImportEngine::execute`].
#[derive(Clone, Debug, Default)]
pub struct ImportResult {
    /// Documents that ended up resolved and ready to write to the target.
    pub imported: Vec<Document>,
    /// Conflicts that still need a resolution before they can be imported.
    pub still_unresolved: Vec<ImportConflict>,
}

/// Parse a resolution name tolerantly, accepting the synonyms named in §4.8
/// step 3 (case- and separator-insensitive). Permission against a specific
/// conflict's type is checked separately via [`ImportResolution::allowed_for`].
///
/// # Errors
/// Returns [`crate::error::DmmsError::Validation`] if `s` matches none of the
/// known names or synonyms.
pub fn parse_resolution(s: &str) -> crate::error::Result<ImportResolution> {
    match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "keep_source" | "source" | "ours" | "mine" | "local" => Ok(ImportResolution::KeepSource),
        "keep_target" | "target" | "theirs" | "incoming" | "remote" => Ok(ImportResolution::KeepTarget),
        "merge" | "field_merge" => Ok(ImportResolution::Merge),
        "skip" | "manual_review" | "manual" => Ok(ImportResolution::Skip),
        "custom" => Ok(ImportResolution::Custom),
        "namespace" => Ok(ImportResolution::Namespace),
        "keep_first" | "first" => Ok(ImportResolution::KeepFirst),
        "keep_last" | "last" => Ok(ImportResolution::KeepLast),
        other => Err(crate::error::DmmsError::Validation {
            detail: format!(
                "unknown resolution '{other}': expected one of keep_source, keep_target, merge, skip, custom, namespace, keep_first, keep_last"
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;

    fn doc(id: &str, content: &str) -> Document {
        Document::new(id, content, Metadata::new())
    }

    fn batch(source: &str, documents: Vec<Document>) -> ImportBatch {
        ImportBatch {
            source_collection: source.to_owned(),
            metadata: Metadata::new(),
            documents,
        }
    }

    #[test]
    fn s7_clean_import_with_no_collisions() {
        let batches = vec![batch("archive", vec![doc("d1", "hello")])];
        let preview = ImportEngine::preview("target", &batches, &HashMap::new(), None);
        assert_eq!(preview.clean.len(), 1);
        assert!(preview.conflicts.is_empty());
    }

    #[test]
    fn s7_content_modification_against_existing_target_doc() {
        let batches = vec![batch("archive", vec![doc("d1", "new content")])];
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), doc("d1", "old content"));
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        assert_eq!(preview.conflicts.len(), 1);
        assert!(preview.conflicts[0].against_existing_target);
        assert_eq!(preview.conflicts[0].conflict_type, ImportConflictType::ContentModification);
        assert!(preview.conflicts[0].conflict_id.starts_with("imp_"));
    }

    #[test]
    fn metadata_only_difference_against_target_is_metadata_conflict() {
        let mut incoming = doc("d1", "same");
        incoming.metadata.insert("k".to_owned(), serde_json::json!("new"));
        let batches = vec![batch("archive", vec![incoming])];
        let mut existing_doc = doc("d1", "same");
        existing_doc.metadata.insert("k".to_owned(), serde_json::json!("old"));
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), existing_doc);
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        assert_eq!(preview.conflicts.len(), 1);
        assert_eq!(preview.conflicts[0].conflict_type, ImportConflictType::MetadataConflict);
    }

    #[test]
    fn same_content_and_metadata_against_target_is_idempotent() {
        let batches = vec![batch("archive", vec![doc("d1", "same")])];
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), doc("d1", "same"));
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        assert!(preview.conflicts.is_empty());
        assert_eq!(preview.clean.len(), 1);
    }

    #[test]
    fn mismatched_source_metadata_against_existing_target_is_collection_mismatch() {
        let mut source = batch("archive", vec![doc("d1", "hello")]);
        source.metadata.insert("schema".to_owned(), serde_json::json!("v2"));
        let mut target_metadata = Metadata::new();
        target_metadata.insert("schema".to_owned(), serde_json::json!("v1"));

        let preview = ImportEngine::preview("target", &[source], &HashMap::new(), Some(&target_metadata));
        assert_eq!(preview.conflicts.len(), 1);
        assert_eq!(preview.conflicts[0].conflict_type, ImportConflictType::CollectionMismatch);
        assert!(preview.conflicts[0].conflict_id.starts_with("imp_"));
    }

    #[test]
    fn matching_source_metadata_against_existing_target_is_no_conflict() {
        let mut target_metadata = Metadata::new();
        target_metadata.insert("schema".to_owned(), serde_json::json!("v1"));
        let mut source = batch("archive", vec![doc("d1", "hello")]);
        source.metadata.insert("schema".to_owned(), serde_json::json!("v1"));

        let preview = ImportEngine::preview("target", &[source], &HashMap::new(), Some(&target_metadata));
        assert!(preview.conflicts.iter().all(|c| c.conflict_type != ImportConflictType::CollectionMismatch));
    }

    #[test]
    fn s8_cross_collection_conflict_is_order_independent() {
        let batches_a = vec![
            batch("alpha", vec![doc("d1", "version a")]),
            batch("beta", vec![doc("d1", "version b")]),
        ];
        let batches_b = vec![batches_a[1].clone(), batches_a[0].clone()];

        let preview_a = ImportEngine::preview("target", &batches_a, &HashMap::new(), None);
        let preview_b = ImportEngine::preview("target", &batches_b, &HashMap::new(), None);

        assert_eq!(preview_a.conflicts.len(), 1);
        assert!(preview_a.conflicts[0].conflict_id.starts_with("xc_"));
        assert_eq!(preview_a.conflicts[0].conflict_type, ImportConflictType::IdCollision);
        assert_eq!(preview_a.conflicts[0].conflict_id, preview_b.conflicts[0].conflict_id);
    }

    #[test]
    fn cross_collection_identical_content_is_not_a_conflict() {
        let batches = vec![batch("alpha", vec![doc("d1", "same")]), batch("beta", vec![doc("d1", "same")])];
        let preview = ImportEngine::preview("target", &batches, &HashMap::new(), None);
        assert!(preview.conflicts.is_empty());
        assert_eq!(preview.clean.len(), 1);
    }

    #[test]
    fn execute_applies_resolution_and_reports_unresolved() {
        let batches = vec![batch("archive", vec![doc("d1", "incoming")])];
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), doc("d1", "existing"));
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        let conflict_id = preview.conflicts[0].conflict_id.clone();

        let mut resolutions = HashMap::new();
        resolutions.insert(conflict_id, ImportResolution::KeepSource);
        let result = ImportEngine::execute(&preview, &batches, &existing, &resolutions);
        assert_eq!(result.imported.len(), 1);
        assert_eq!(result.imported[0].content, "incoming");
        assert!(result.still_unresolved.is_empty());
    }

    #[test]
    fn execute_leaves_unresolved_conflicts_unresolved() {
        let batches = vec![batch("archive", vec![doc("d1", "incoming")])];
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), doc("d1", "existing"));
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        let result = ImportEngine::execute(&preview, &batches, &existing, &HashMap::new());
        assert!(result.imported.is_empty());
        assert_eq!(result.still_unresolved.len(), 1);
    }

    #[test]
    fn execute_rejects_resolution_not_permitted_for_conflict_type() {
        // `namespace` is only valid for `IdCollision`, not `ContentModification`.
        let batches = vec![batch("archive", vec![doc("d1", "incoming")])];
        let mut existing = HashMap::new();
        existing.insert("d1".to_owned(), doc("d1", "existing"));
        let preview = ImportEngine::preview("target", &batches, &existing, None);
        let conflict_id = preview.conflicts[0].conflict_id.clone();

        let mut resolutions = HashMap::new();
        resolutions.insert(conflict_id, ImportResolution::Namespace);
        let result = ImportEngine::execute(&preview, &batches, &existing, &resolutions);
        assert!(result.imported.is_empty());
        assert_eq!(result.still_unresolved.len(), 1);
    }

    #[test]
    fn namespace_resolution_renames_to_source_prefixed_id() {
        let batches = vec![
            batch("alpha", vec![doc("d1", "version a")]),
            batch("beta", vec![doc("d1", "version b")]),
        ];
        let preview = ImportEngine::preview("target", &batches, &HashMap::new(), None);
        let conflict_id = preview.conflicts[0].conflict_id.clone();
        assert_eq!(preview.conflicts[0].source_collections, vec!["alpha".to_owned(), "beta".to_owned()]);

        let mut resolutions = HashMap::new();
        resolutions.insert(conflict_id, ImportResolution::Namespace);
        let result = ImportEngine::execute(&preview, &batches, &HashMap::new(), &resolutions);
        assert_eq!(result.imported.len(), 1);
        assert_eq!(result.imported[0].doc_id, "alpha__d1");
        assert!(result.still_unresolved.is_empty());
    }

    #[test]
    fn keep_last_resolution_picks_the_last_listed_source() {
        let batches = vec![
            batch("alpha", vec![doc("d1", "version a")]),
            batch("beta", vec![doc("d1", "version b")]),
        ];
        let preview = ImportEngine::preview("target", &batches, &HashMap::new(), None);
        let conflict_id = preview.conflicts[0].conflict_id.clone();

        let mut resolutions = HashMap::new();
        resolutions.insert(conflict_id, ImportResolution::KeepLast);
        let result = ImportEngine::execute(&preview, &batches, &HashMap::new(), &resolutions);
        assert_eq!(result.imported.len(), 1);
        assert_eq!(result.imported[0].content, "version b");
    }

    #[test]
    fn s8_expand_filter_specs_selects_matching_sources_and_preserves_distinct_mappings() {
        let available = ["archive_2024_q1", "archive_2024_q2", "current"];
        let specs = vec![
            ImportFilterSpec {
                name: "archive_*".to_owned(),
                import_into: "consolidated".to_owned(),
                documents: None,
            },
            ImportFilterSpec {
                name: "current".to_owned(),
                import_into: "active".to_owned(),
                documents: None,
            },
        ];
        let mappings = ImportEngine::expand_filter_specs(&available, &specs);
        assert_eq!(mappings.len(), 3);
        assert!(mappings
            .iter()
            .any(|m| m.source_collection == "archive_2024_q1" && m.import_into == "consolidated"));
        assert!(mappings.iter().any(|m| m.source_collection == "current" && m.import_into == "active"));

        let targets = ImportEngine::target_collections(&mappings);
        assert_eq!(targets, vec!["consolidated".to_owned(), "active".to_owned()]);
    }

    #[test]
    fn empty_filter_specs_imports_every_collection_into_itself() {
        let available = ["alpha", "beta"];
        let mappings = ImportEngine::expand_filter_specs(&available, &[]);
        assert_eq!(mappings.len(), 2);
        assert!(mappings.iter().all(|m| m.source_collection == m.import_into));
    }

    #[test]
    fn parse_resolution_accepts_spec_named_synonyms() {
        assert_eq!(parse_resolution("keep_source").unwrap(), ImportResolution::KeepSource);
        assert_eq!(parse_resolution("target").unwrap(), ImportResolution::KeepTarget);
        assert_eq!(parse_resolution("namespace").unwrap(), ImportResolution::Namespace);
        assert_eq!(parse_resolution("Keep-First").unwrap(), ImportResolution::KeepFirst);
        assert_eq!(parse_resolution("last").unwrap(), ImportResolution::KeepLast);
        assert_eq!(parse_resolution("custom").unwrap(), ImportResolution::Custom);
        assert!(parse_resolution("bogus").is_err());
    }

    #[test]
    fn allowed_for_gates_resolutions_per_conflict_type_table() {
        assert!(ImportResolution::Custom.allowed_for(ImportConflictType::ContentModification));
        assert!(!ImportResolution::Custom.allowed_for(ImportConflictType::MetadataConflict));
        assert!(!ImportResolution::Namespace.allowed_for(ImportConflictType::ContentModification));
        assert!(ImportResolution::Namespace.allowed_for(ImportConflictType::IdCollision));
        assert!(ImportResolution::KeepTarget.allowed_for(ImportConflictType::CollectionMismatch));
        assert!(!ImportResolution::Merge.allowed_for(ImportConflictType::CollectionMismatch));
    }
}

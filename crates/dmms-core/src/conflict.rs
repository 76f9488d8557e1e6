//! Structured merge-conflict model and the conflict analyzer (§3, §4.7).
//!
//! Conflicts are structured, per-document records — never marker soup — so
//! they can be presented to an agent or human for resolution, or resolved
//! automatically where the rules in §4.7 allow it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::Metadata;

/// The kind of three-way conflict detected between two document versions (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides modified the document's content.
    ContentModification,
    /// Both sides added the document independently, with different content.
    AddAdd,
    /// One side deleted the document, the other modified it.
    DeleteModify,
    /// Only metadata differs between the two sides.
    MetadataConflict,
}

impl ConflictType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ContentModification => "content_modification",
            Self::AddAdd => "add_add",
            Self::DeleteModify => "delete_modify",
            Self::MetadataConflict => "metadata_conflict",
        }
    }
}

/// A named resolution strategy accepted for merge conflicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep our side's value.
    KeepOurs,
    /// Keep their side's value.
    KeepTheirs,
    /// Merge non-overlapping fields / content where possible.
    FieldMerge,
    /// A human must look at it; no automatic resolution applies.
    ManualReview,
}

/// A three-way document conflict produced by the [`ConflictAnalyzer`] (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic ID: `conf_` + 12 hex chars of
    /// `SHA-256(collection|doc_id|type)`.
    pub conflict_id: String,
    /// The collection the conflicting document belongs to.
    pub collection: String,
    /// The conflicting document's ID.
    pub doc_id: String,
    /// Classification of the conflict.
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// Content at the merge base, if any.
    pub base_content: Option<String>,
    /// Our side's content, if any.
    pub ours_content: Option<String>,
    /// Their side's content, if any.
    pub theirs_content: Option<String>,
    /// Hash of `base_content`.
    pub base_hash: String,
    /// Hash of `ours_content`.
    pub ours_hash: String,
    /// Hash of `theirs_content`.
    pub theirs_hash: String,
    /// Metadata at the merge base.
    pub base_values: Metadata,
    /// Our side's metadata.
    pub ours_values: Metadata,
    /// Their side's metadata.
    pub theirs_values: Metadata,
    /// Whether [`ConflictAnalyzer`] can resolve this without human input.
    pub auto_resolvable: bool,
    /// The resolution the analyzer suggests.
    pub suggested_resolution: Resolution,
}

/// Compute the deterministic conflict ID for `(collection, doc_id, type)` (§3).
#[must_use]
pub fn conflict_id(collection: &str, doc_id: &str, conflict_type: ConflictType) -> String {
    let input = format!("{collection}|{doc_id}|{}", conflict_type.as_str());
    let digest = Sha256::digest(input.as_bytes());
    format!("conf_{}", &hex::encode(digest)[..12])
}

/// Input snapshot of one document at one side of a three-way comparison.
#[derive(Clone, Debug, Default)]
pub struct DocSnapshot {
    /// Content, if the document exists on this side.
    pub content: Option<String>,
    /// Metadata, if the document exists on this side.
    pub metadata: Metadata,
}

impl DocSnapshot {
    fn hash(&self) -> String {
        self.content
            .as_deref()
            .map(crate::hash::content_hash)
            .unwrap_or_default()
    }
}

/// Classifies and scores conflicts between two sides of a three-way document
/// comparison (§4.7). The actual VCS diff/merge-base computation is the
/// caller's responsibility (via the VCS gateway); this type consumes already
/// materialized base/ours/theirs snapshots so it has no dependency on any
/// particular VCS client.
pub struct ConflictAnalyzer;

impl ConflictAnalyzer {
    /// Classify a single document's three-way comparison into a [`Conflict`],
    /// or `None` if the three sides don't actually conflict.
    #[must_use]
    pub fn analyze_document(
        collection: &str,
        doc_id: &str,
        base: &DocSnapshot,
        ours: &DocSnapshot,
        theirs: &DocSnapshot,
    ) -> Option<Conflict> {
        let base_hash = base.hash();
        let ours_hash = ours.hash();
        let theirs_hash = theirs.hash();

        let ours_changed = ours.content.is_some() && ours_hash != base_hash;
        let theirs_changed = theirs.content.is_some() && theirs_hash != base_hash;
        let ours_deleted = base.content.is_some() && ours.content.is_none();
        let theirs_deleted = base.content.is_some() && theirs.content.is_none();

        let conflict_type = if base.content.is_none() && ours.content.is_some() && theirs.content.is_some() {
            if ours_hash == theirs_hash {
                return None;
            }
            ConflictType::AddAdd
        } else if ours_deleted && theirs_changed || theirs_deleted && ours_changed {
            ConflictType::DeleteModify
        } else if ours_changed && theirs_changed {
            if ours_hash == theirs_hash {
                // Both sides converged on the same content; metadata may
                // still differ below.
                if ours.metadata == theirs.metadata {
                    return None;
                }
                ConflictType::MetadataConflict
            } else {
                ConflictType::ContentModification
            }
        } else if ours.metadata != theirs.metadata && ours_hash == theirs_hash {
            ConflictType::MetadataConflict
        } else {
            return None;
        };

        let auto_resolvable = match conflict_type {
            ConflictType::ContentModification => {
                ours_hash == base_hash || theirs_hash == base_hash || ours_hash == theirs_hash
            }
            ConflictType::AddAdd => ours_hash == theirs_hash,
            ConflictType::DeleteModify => false,
            ConflictType::MetadataConflict => true,
        };

        let suggested_resolution = if !auto_resolvable {
            Resolution::ManualReview
        } else {
            match conflict_type {
                ConflictType::ContentModification if theirs_hash == base_hash => Resolution::KeepOurs,
                ConflictType::ContentModification => Resolution::KeepTheirs,
                ConflictType::AddAdd => Resolution::KeepOurs,
                ConflictType::MetadataConflict => Resolution::FieldMerge,
                ConflictType::DeleteModify => Resolution::ManualReview,
            }
        };

        Some(Conflict {
            conflict_id: conflict_id(collection, doc_id, conflict_type),
            collection: collection.to_owned(),
            doc_id: doc_id.to_owned(),
            conflict_type,
            base_content: base.content.clone(),
            ours_content: ours.content.clone(),
            theirs_content: theirs.content.clone(),
            base_hash,
            ours_hash,
            theirs_hash,
            base_values: base.metadata.clone(),
            ours_values: ours.metadata.clone(),
            theirs_values: theirs.metadata.clone(),
            auto_resolvable,
            suggested_resolution,
        })
    }

    /// Returns `true` if none of `conflicts` requires manual resolution.
    #[must_use]
    pub fn can_auto_merge(conflicts: &[Conflict]) -> bool {
        conflicts.iter().all(|c| c.auto_resolvable)
    }
}

/// A data-loss warning surfaced by [`preview_resolution`]: `field` was
/// present with a different value on `dropped_side` and will be discarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataLossWarning {
    /// The metadata field (or `"content"`) affected.
    pub field: String,
    /// Which side's value is dropped (`"ours"` or `"theirs"`).
    pub dropped_side: String,
}

/// The result of previewing a chosen resolution strategy against a [`Conflict`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPreview {
    /// Content that would result from applying the strategy.
    pub content: Option<String>,
    /// Metadata that would result from applying the strategy.
    pub metadata: Metadata,
    /// Confidence score, 0-100.
    pub confidence: u8,
    /// Data-loss warnings for fields/content that would be discarded.
    pub warnings: Vec<DataLossWarning>,
}

/// Preview the effect of applying `resolution` to `conflict` (§4.7).
///
/// # Panics
/// Never panics; unsupported resolution/conflict-type combinations simply
/// produce a low-confidence preview with a warning rather than an error,
/// since a preview is advisory and must always be computable.
#[must_use]
pub fn preview_resolution(conflict: &Conflict, resolution: Resolution) -> ResolutionPreview {
    match resolution {
        Resolution::KeepOurs => ResolutionPreview {
            content: conflict.ours_content.clone(),
            metadata: conflict.ours_values.clone(),
            confidence: if conflict.auto_resolvable { 100 } else { 60 },
            warnings: theirs_only_warnings(conflict),
        },
        Resolution::KeepTheirs => ResolutionPreview {
            content: conflict.theirs_content.clone(),
            metadata: conflict.theirs_values.clone(),
            confidence: if conflict.auto_resolvable { 100 } else { 60 },
            warnings: ours_only_warnings(conflict),
        },
        Resolution::FieldMerge => field_merge_preview(conflict),
        Resolution::ManualReview => ResolutionPreview {
            content: None,
            metadata: Metadata::new(),
            confidence: 0,
            warnings: vec![DataLossWarning {
                field: "content".to_owned(),
                dropped_side: "unresolved".to_owned(),
            }],
        },
    }
}

fn theirs_only_warnings(conflict: &Conflict) -> Vec<DataLossWarning> {
    conflict
        .theirs_values
        .iter()
        .filter(|(k, v)| conflict.ours_values.get(*k) != Some(v))
        .map(|(k, _)| DataLossWarning {
            field: k.clone(),
            dropped_side: "theirs".to_owned(),
        })
        .collect()
}

fn ours_only_warnings(conflict: &Conflict) -> Vec<DataLossWarning> {
    conflict
        .ours_values
        .iter()
        .filter(|(k, v)| conflict.theirs_values.get(*k) != Some(v))
        .map(|(k, _)| DataLossWarning {
            field: k.clone(),
            dropped_side: "ours".to_owned(),
        })
        .collect()
}

fn field_merge_preview(conflict: &Conflict) -> ResolutionPreview {
    let mut merged = conflict.base_values.clone();
    let mut warnings = Vec::new();

    for (key, ours_value) in &conflict.ours_values {
        let theirs_value = conflict.theirs_values.get(key);
        match theirs_value {
            None => {
                merged.insert(key.clone(), ours_value.clone());
            }
            Some(theirs_value) if theirs_value == ours_value => {
                merged.insert(key.clone(), ours_value.clone());
            }
            Some(theirs_value) => {
                // Both sides touched the same field differently: a newer
                // timestamp or a higher integer version wins (§4.7 rule 4),
                // falling back to ours.
                let (chosen, dropped_side) = prefer_overlapping_value(ours_value, theirs_value);
                merged.insert(key.clone(), chosen.clone());
                warnings.push(DataLossWarning {
                    field: key.clone(),
                    dropped_side: dropped_side.to_owned(),
                });
            }
        }
    }
    for (key, theirs_value) in &conflict.theirs_values {
        if !conflict.ours_values.contains_key(key) {
            merged.insert(key.clone(), theirs_value.clone());
        }
    }

    let content = if conflict.ours_hash == conflict.base_hash {
        conflict.theirs_content.clone()
    } else {
        conflict.ours_content.clone()
    };

    ResolutionPreview {
        content,
        metadata: merged,
        confidence: if warnings.is_empty() { 100 } else { 70 },
        warnings,
    }
}

/// Resolve a field both sides changed to a different value: an RFC 3339
/// timestamp string newer than the other side wins; failing that, a higher
/// integer wins; failing that, ours wins. Returns the chosen value and which
/// side was dropped.
fn prefer_overlapping_value<'a>(ours: &'a Value, theirs: &'a Value) -> (&'a Value, &'static str) {
    if let (Some(ours_ts), Some(theirs_ts)) = (parse_timestamp(ours), parse_timestamp(theirs)) {
        return if theirs_ts > ours_ts { (theirs, "ours") } else { (ours, "theirs") };
    }
    if let (Some(ours_int), Some(theirs_int)) = (ours.as_i64(), theirs.as_i64()) {
        return if theirs_int > ours_int { (theirs, "ours") } else { (ours, "theirs") };
    }
    (ours, "theirs")
}

fn parse_timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    value
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(content: &str) -> DocSnapshot {
        DocSnapshot {
            content: Some(content.to_owned()),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn s6_three_way_conflict_classification() {
        let base = snap("X");
        let ours = snap("Y");
        let theirs = snap("Z");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::ContentModification);
        assert!(!conflict.auto_resolvable);
        assert_eq!(conflict.suggested_resolution, Resolution::ManualReview);
    }

    #[test]
    fn s6_theirs_equals_base_is_auto_resolvable() {
        let base = snap("X");
        let ours = snap("Y");
        let theirs = snap("X");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        assert!(conflict.auto_resolvable);
        assert_eq!(conflict.suggested_resolution, Resolution::KeepOurs);
    }

    #[test]
    fn add_add_identical_content_is_not_a_conflict() {
        let base = DocSnapshot::default();
        let ours = snap("same");
        let theirs = snap("same");
        assert!(ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).is_none());
    }

    #[test]
    fn add_add_different_content_is_conflict_not_auto_resolvable() {
        let base = DocSnapshot::default();
        let ours = snap("a");
        let theirs = snap("b");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::AddAdd);
        assert!(!conflict.auto_resolvable);
    }

    #[test]
    fn delete_modify_never_auto_resolvable() {
        let base = snap("X");
        let ours = DocSnapshot {
            content: None,
            metadata: Metadata::new(),
        };
        let theirs = snap("Y");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::DeleteModify);
        assert!(!conflict.auto_resolvable);
    }

    #[test]
    fn metadata_only_conflict_is_auto_resolvable() {
        let mut ours = snap("same");
        ours.metadata.insert("k".to_owned(), json!("a"));
        let mut theirs = snap("same");
        theirs.metadata.insert("k".to_owned(), json!("b"));
        let base = snap("same");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::MetadataConflict);
        assert!(conflict.auto_resolvable);
    }

    #[test]
    fn conflict_id_is_deterministic() {
        let a = conflict_id("issueLogs", "planned_approach", ConflictType::ContentModification);
        let b = conflict_id("issueLogs", "planned_approach", ConflictType::ContentModification);
        assert_eq!(a, b);
        assert!(a.starts_with("conf_"));
        assert_eq!(a.len(), "conf_".len() + 12);
    }

    #[test]
    fn can_auto_merge_requires_all_resolvable() {
        let base = snap("X");
        let resolvable = ConflictAnalyzer::analyze_document(
            "docs",
            "d1",
            &base,
            &snap("X"),
            &snap("Y"),
        );
        let unresolvable =
            ConflictAnalyzer::analyze_document("docs", "d2", &base, &snap("Y"), &snap("Z"))
                .unwrap();
        let mut all = vec![unresolvable];
        if let Some(r) = resolvable {
            all.push(r);
        }
        assert!(!ConflictAnalyzer::can_auto_merge(&all));
    }

    #[test]
    fn preview_keep_ours_warns_about_theirs_only_fields() {
        let mut ours = snap("X");
        ours.metadata.insert("a".to_owned(), json!(1));
        let mut theirs = snap("Y");
        theirs.metadata.insert("b".to_owned(), json!(2));
        let base = snap("X");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        let preview = preview_resolution(&conflict, Resolution::KeepOurs);
        assert_eq!(preview.content, Some("X".to_owned()));
        assert_eq!(preview.warnings.len(), 1);
        assert_eq!(preview.warnings[0].field, "b");
        assert_eq!(preview.warnings[0].dropped_side, "theirs");
    }

    #[test]
    fn preview_field_merge_combines_non_overlapping_fields() {
        let mut ours = snap("same");
        ours.metadata.insert("a".to_owned(), json!(1));
        let mut theirs = snap("same");
        theirs.metadata.insert("b".to_owned(), json!(2));
        let base = snap("same");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        let preview = preview_resolution(&conflict, Resolution::FieldMerge);
        assert_eq!(preview.metadata.get("a"), Some(&json!(1)));
        assert_eq!(preview.metadata.get("b"), Some(&json!(2)));
        assert!(preview.warnings.is_empty());
        assert_eq!(preview.confidence, 100);
    }

    #[test]
    fn preview_field_merge_prefers_newer_timestamp_on_overlap() {
        let mut ours = snap("same");
        ours.metadata.insert("updated_at".to_owned(), json!("2024-01-01T00:00:00Z"));
        let mut theirs = snap("same");
        theirs.metadata.insert("updated_at".to_owned(), json!("2024-06-01T00:00:00Z"));
        let base = snap("same");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        let preview = preview_resolution(&conflict, Resolution::FieldMerge);
        assert_eq!(preview.metadata.get("updated_at"), Some(&json!("2024-06-01T00:00:00Z")));
        assert_eq!(preview.warnings[0].dropped_side, "ours");
    }

    #[test]
    fn preview_field_merge_prefers_higher_integer_version_on_overlap() {
        let mut ours = snap("same");
        ours.metadata.insert("version".to_owned(), json!(3));
        let mut theirs = snap("same");
        theirs.metadata.insert("version".to_owned(), json!(7));
        let base = snap("same");
        let conflict =
            ConflictAnalyzer::analyze_document("docs", "d1", &base, &ours, &theirs).unwrap();
        let preview = preview_resolution(&conflict, Resolution::FieldMerge);
        assert_eq!(preview.metadata.get("version"), Some(&json!(7)));
        assert_eq!(preview.warnings[0].dropped_side, "ours");
    }
}

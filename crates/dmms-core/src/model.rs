//! Core data-model types shared across the sync core (§3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A free-form string-to-scalar metadata map, used by both collections and
/// documents. `BTreeMap` gives deterministic iteration order, which matters
/// for canonical JSON embedding (§7/§9).
pub type Metadata = BTreeMap<String, Value>;

/// Status of a [`PendingDocOp`] / [`PendingCollectionOp`] (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Recorded locally, not yet written to the VCS working set.
    Pending,
    /// Written to the VCS working set, not yet committed.
    Staged,
    /// Committed to the VCS; eligible for cleanup.
    Committed,
}

impl OpStatus {
    /// Stable string form used as the SQLite column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Committed => "committed",
        }
    }

    /// Parse the column value written by [`Self::as_str`].
    ///
    /// # Errors
    /// Returns [`crate::error::DmmsError::Internal`] if `s` is not a known status.
    pub fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "staged" => Ok(Self::Staged),
            "committed" => Ok(Self::Committed),
            other => Err(crate::error::DmmsError::Internal {
                detail: format!("unknown op status '{other}' in database"),
            }),
        }
    }
}

/// The kind of collection-level mutation a [`PendingCollectionOp`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOpType {
    /// The collection (and cascade-deleted documents) was removed.
    Deletion,
    /// The collection was renamed.
    Rename,
    /// The collection's metadata was updated in place.
    MetadataUpdate,
}

impl CollectionOpType {
    /// Stable string form used as the SQLite column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deletion => "deletion",
            Self::Rename => "rename",
            Self::MetadataUpdate => "metadata_update",
        }
    }

    /// Parse the column value written by [`Self::as_str`].
    ///
    /// # Errors
    /// Returns [`crate::error::DmmsError::Internal`] if `s` is not a known type.
    pub fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "deletion" => Ok(Self::Deletion),
            "rename" => Ok(Self::Rename),
            "metadata_update" => Ok(Self::MetadataUpdate),
            other => Err(crate::error::DmmsError::Internal {
                detail: format!("unknown collection op type '{other}' in database"),
            }),
        }
    }
}

/// A durable record of a local document-level operation not yet reflected
/// in the VCS (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingDocOp {
    /// Row identifier.
    pub id: i64,
    /// Path to the repository this operation belongs to.
    pub repo: String,
    /// The logical document ID affected.
    pub doc_id: String,
    /// The collection the document belongs to.
    pub collection: String,
    /// Content hash of the document before the operation.
    pub original_content_hash: String,
    /// Serialized metadata of the document before the operation.
    pub original_metadata: Metadata,
    /// Branch the operation was recorded on.
    pub branch: String,
    /// VCS commit the operation is based on.
    pub base_commit: String,
    /// Where the operation originated (e.g. `"tool"`).
    pub source: String,
    /// Current lifecycle status.
    pub status: OpStatus,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A durable record of a local collection-level operation (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingCollectionOp {
    /// Row identifier.
    pub id: i64,
    /// Path to the repository this operation belongs to.
    pub repo: String,
    /// The collection's original name — the key used to match on commit,
    /// even for a rename.
    pub collection_name: String,
    /// The new name, present only for [`CollectionOpType::Rename`].
    pub new_name: Option<String>,
    /// Metadata before the operation.
    pub original_metadata: Metadata,
    /// Metadata after the operation (equal to `original_metadata` for a pure
    /// rename with no metadata change).
    pub new_metadata: Metadata,
    /// Branch the operation was recorded on.
    pub branch: String,
    /// VCS commit the operation is based on.
    pub base_commit: String,
    /// What kind of mutation this row records.
    pub operation_type: CollectionOpType,
    /// Current lifecycle status.
    pub status: OpStatus,
}

/// Sync status of a (repo, collection, branch) tuple (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Vector store and VCS agree as of `last_sync_commit`.
    Synced,
    /// A sync pass is in progress or queued.
    Pending,
    /// Local mutations exist that haven't been committed to the VCS.
    LocalChanges,
    /// The last sync attempt failed; see `error_message`.
    Error,
}

impl SyncStatus {
    /// Stable string form used as the SQLite column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::LocalChanges => "local_changes",
            Self::Error => "error",
        }
    }

    /// Parse the column value written by [`Self::as_str`].
    ///
    /// # Errors
    /// Returns [`crate::error::DmmsError::Internal`] if `s` is not a known status.
    pub fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "local_changes" => Ok(Self::LocalChanges),
            "error" => Ok(Self::Error),
            other => Err(crate::error::DmmsError::Internal {
                detail: format!("unknown sync status '{other}' in database"),
            }),
        }
    }
}

/// The last-known coherent position of a (repo, collection, branch) tuple (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Repository path.
    pub repo: String,
    /// Collection name.
    pub collection: String,
    /// Branch name.
    pub branch: String,
    /// The VCS commit this collection was last synced against.
    pub last_sync_commit: Option<String>,
    /// Document count observed at last sync.
    pub doc_count: u64,
    /// Chunk count observed at last sync.
    pub chunk_count: u64,
    /// Tag identifying the embedding model in use, for drift detection.
    pub embedding_model: Option<String>,
    /// Current status.
    pub status: SyncStatus,
    /// Error detail when `status == Error`.
    pub error_message: Option<String>,
    /// Number of local changes not yet reflected in the VCS.
    pub local_changes_count: u64,
    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
}

/// A logical document as seen by the sync core, independent of how many
/// chunks it is stored as.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The user-visible document ID within its collection.
    pub doc_id: String,
    /// Full text content.
    pub content: String,
    /// Free-form metadata.
    pub metadata: Metadata,
    /// SHA-256 content hash, lowercase hex (empty string sentinel for "no content").
    pub content_hash: String,
}

impl Document {
    /// Construct a document, deriving `content_hash` from `content`.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, content: impl Into<String>, metadata: Metadata) -> Self {
        let content = content.into();
        let content_hash = crate::hash::content_hash(&content);
        Self {
            doc_id: doc_id.into(),
            content,
            metadata,
            content_hash,
        }
    }
}

/// Name of the Dolt-side meta-table holding one row per collection, keyed by
/// `doc_id == collection name`, used the same way any other collection's
/// document table is (§3, §4.2).
pub const COLLECTIONS_TABLE: &str = "collections";

/// A named bucket of documents (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Case-sensitive, filesystem-safe name, unique within a repository.
    pub name: String,
    /// Free-form metadata.
    pub metadata: Metadata,
}

/// Characters permitted in a collection name, beyond alphanumerics.
const COLLECTION_NAME_EXTRA_CHARS: &[char] = &['-', '_', '.'];

/// Validate a collection name against the filesystem-safe charset invariant (§3).
///
/// # Errors
/// Returns [`crate::error::DmmsError::Validation`] if the name is empty or
/// contains characters outside `[A-Za-z0-9._-]`.
pub fn validate_collection_name(name: &str) -> crate::error::Result<()> {
    if name.is_empty() {
        return Err(crate::error::DmmsError::Validation {
            detail: "collection name must not be empty".to_owned(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || COLLECTION_NAME_EXTRA_CHARS.contains(&c))
    {
        return Err(crate::error::DmmsError::Validation {
            detail: format!(
                "collection name '{name}' contains characters outside [A-Za-z0-9._-]"
            ),
        });
    }
    Ok(())
}

//! On-disk state manifest and the init-time sync-state sanity check (§4.10).
//!
//! The manifest is a small JSON snapshot written to `.dmms/state.json`
//! recording what the sync core believes is true about each
//! `(collection, branch)` pair the last time it finished a sync pass. It
//! exists so a server restart can cheaply tell "did anything change behind
//! my back" (another process ran `dolt checkout`, someone hand-edited the
//! vector store) without re-scanning every document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DmmsError, Result};
use crate::model::SyncState;
use crate::store::migrations::CURRENT_SCHEMA_VERSION;

/// Default manifest path, relative to a repository root.
pub const MANIFEST_RELATIVE_PATH: &str = ".dmms/state.json";

/// Snapshot of one `(collection, branch)` pair's last-known-good position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Document count as of the last completed sync.
    pub doc_count: u64,
    /// Chunk count as of the last completed sync.
    pub chunk_count: u64,
    /// The VCS commit the collection was synced against.
    pub last_sync_commit: Option<String>,
}

fn manifest_key(collection: &str, branch: &str) -> String {
    format!("{collection}@{branch}")
}

/// The on-disk state manifest (§4.10).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateManifest {
    /// Schema version of this manifest file, independent of the pending-op
    /// store's schema version.
    pub schema_version: i64,
    /// Entries keyed by `"{collection}@{branch}"`.
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Default for StateManifest {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl StateManifest {
    /// Load the manifest from `path`, or return a fresh default one if the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if its schema version is newer than this build supports.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(DmmsError::from(err)),
        };
        let manifest: Self = serde_json::from_str(&raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate internal consistency of the manifest.
    ///
    /// # Errors
    /// Returns [`DmmsError::SchemaMigrationRequired`] if `schema_version` is
    /// newer than [`CURRENT_SCHEMA_VERSION`], or [`DmmsError::Validation`] if
    /// any entry key is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(DmmsError::SchemaMigrationRequired {
                found_version: self.schema_version,
                expected_version: CURRENT_SCHEMA_VERSION,
            });
        }
        for key in self.entries.keys() {
            if !key.contains('@') {
                return Err(DmmsError::Validation {
                    detail: format!("manifest entry key '{key}' is missing the '@branch' suffix"),
                });
            }
        }
        Ok(())
    }

    /// Atomically write the manifest to `path`: write to a sibling temp file,
    /// then rename over the destination, so a crash mid-write never leaves a
    /// half-written manifest behind.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the temp
    /// file cannot be written, or the rename fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = tmp_path_for(path);
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Record (or overwrite) the entry for `(collection, branch)`.
    pub fn set(&mut self, collection: &str, branch: &str, entry: ManifestEntry) {
        self.entries.insert(manifest_key(collection, branch), entry);
    }

    /// Read the entry for `(collection, branch)`, if present.
    #[must_use]
    pub fn get(&self, collection: &str, branch: &str) -> Option<&ManifestEntry> {
        self.entries.get(&manifest_key(collection, branch))
    }

    /// Drop every entry — forces the next [`SyncStateChecker`] pass to treat
    /// every collection as unverified (cache invalidation, §4.10).
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".to_owned());
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// One `(collection, branch)` pair whose manifest snapshot disagrees with the
/// live [`SyncState`] store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Collection name.
    pub collection: String,
    /// Branch name.
    pub branch: String,
    /// Document count recorded in the manifest.
    pub manifest_doc_count: u64,
    /// Document count currently reported by the sync-state store.
    pub store_doc_count: u64,
    /// Commit hash recorded in the manifest.
    pub manifest_commit: Option<String>,
    /// Commit hash currently reported by the sync-state store.
    pub store_commit: Option<String>,
}

/// Result of comparing a [`StateManifest`] against the live [`SyncState`] rows
/// for a repository (§4.10, scenario S10).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStateReport {
    /// Pairs present in both, but with disagreeing counts or commit hashes.
    pub mismatches: Vec<Mismatch>,
    /// Pairs the manifest knows about that the store no longer has a row for.
    pub missing_in_store: Vec<String>,
    /// Pairs the store has a row for that the manifest never recorded.
    pub missing_in_manifest: Vec<String>,
}

/// Compares a [`StateManifest`] snapshot against live [`SyncState`] rows and
/// reports whether they agree (§4.10).
pub struct SyncStateChecker;

impl SyncStateChecker {
    /// Build a [`SyncStateReport`] from one repository's manifest and its
    /// current sync-state rows (as returned by
    /// [`crate::store::SyncStateStore::list_all`]).
    #[must_use]
    pub fn check(manifest: &StateManifest, live_states: &[SyncState]) -> SyncStateReport {
        let mut report = SyncStateReport::default();
        let mut seen_keys = std::collections::HashSet::new();

        for state in live_states {
            let key = manifest_key(&state.collection, &state.branch);
            seen_keys.insert(key.clone());
            match manifest.entries.get(&key) {
                None => report.missing_in_manifest.push(key),
                Some(entry) => {
                    if entry.doc_count != state.doc_count
                        || entry.last_sync_commit != state.last_sync_commit
                    {
                        report.mismatches.push(Mismatch {
                            collection: state.collection.clone(),
                            branch: state.branch.clone(),
                            manifest_doc_count: entry.doc_count,
                            store_doc_count: state.doc_count,
                            manifest_commit: entry.last_sync_commit.clone(),
                            store_commit: state.last_sync_commit.clone(),
                        });
                    }
                }
            }
        }

        for key in manifest.entries.keys() {
            if !seen_keys.contains(key) {
                report.missing_in_store.push(key.clone());
            }
        }

        report
    }

    /// `true` if `report` contains nothing a caller needs to act on before
    /// syncing.
    #[must_use]
    pub fn is_safe_to_sync(report: &SyncStateReport) -> bool {
        report.mismatches.is_empty() && report.missing_in_store.is_empty()
    }

    /// Build a human-readable warning summarizing `report`, or `None` if it's
    /// clean.
    #[must_use]
    pub fn out_of_sync_warning(report: &SyncStateReport) -> Option<String> {
        if Self::is_safe_to_sync(report) {
            return None;
        }
        let mut lines = Vec::new();
        for mismatch in &report.mismatches {
            lines.push(format!(
                "{}@{}: manifest says {} docs at {:?}, store says {} docs at {:?}",
                mismatch.collection,
                mismatch.branch,
                mismatch.manifest_doc_count,
                mismatch.manifest_commit,
                mismatch.store_doc_count,
                mismatch.store_commit
            ));
        }
        for key in &report.missing_in_store {
            lines.push(format!("{key}: manifest entry has no matching sync-state row"));
        }
        Some(format!(
            "sync state is out of date with the state manifest:\n  {}",
            lines.join("\n  ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncStatus;
    use chrono::Utc;

    fn live(collection: &str, branch: &str, doc_count: u64, commit: Option<&str>) -> SyncState {
        SyncState {
            repo: "/repo".to_owned(),
            collection: collection.to_owned(),
            branch: branch.to_owned(),
            last_sync_commit: commit.map(str::to_owned),
            doc_count,
            chunk_count: doc_count,
            embedding_model: None,
            status: SyncStatus::Synced,
            error_message: None,
            local_changes_count: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_round_trips_via_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".dmms/state.json");
        let mut manifest = StateManifest::default();
        manifest.set(
            "alpha",
            "main",
            ManifestEntry {
                doc_count: 5,
                chunk_count: 7,
                last_sync_commit: Some("abc".to_owned()),
            },
        );
        manifest.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let loaded = StateManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope/state.json");
        let loaded = StateManifest::load(&path).unwrap();
        assert_eq!(loaded, StateManifest::default());
    }

    #[test]
    fn validate_rejects_future_schema_version() {
        let manifest = StateManifest {
            schema_version: CURRENT_SCHEMA_VERSION + 1,
            entries: BTreeMap::new(),
        };
        assert!(matches!(
            manifest.validate(),
            Err(DmmsError::SchemaMigrationRequired { .. })
        ));
    }

    #[test]
    fn s10_checker_reports_agreement_when_manifest_matches_store() {
        let mut manifest = StateManifest::default();
        manifest.set(
            "alpha",
            "main",
            ManifestEntry {
                doc_count: 10,
                chunk_count: 14,
                last_sync_commit: Some("abc".to_owned()),
            },
        );
        let states = vec![live("alpha", "main", 10, Some("abc"))];
        let report = SyncStateChecker::check(&manifest, &states);
        assert!(SyncStateChecker::is_safe_to_sync(&report));
        assert!(SyncStateChecker::out_of_sync_warning(&report).is_none());
    }

    #[test]
    fn s10_checker_flags_doc_count_mismatch() {
        let mut manifest = StateManifest::default();
        manifest.set(
            "alpha",
            "main",
            ManifestEntry {
                doc_count: 10,
                chunk_count: 14,
                last_sync_commit: Some("abc".to_owned()),
            },
        );
        let states = vec![live("alpha", "main", 12, Some("abc"))];
        let report = SyncStateChecker::check(&manifest, &states);
        assert!(!SyncStateChecker::is_safe_to_sync(&report));
        assert_eq!(report.mismatches.len(), 1);
        assert!(SyncStateChecker::out_of_sync_warning(&report).unwrap().contains("12 docs"));
    }

    #[test]
    fn checker_flags_rows_missing_from_manifest_and_store() {
        let mut manifest = StateManifest::default();
        manifest.set(
            "beta",
            "main",
            ManifestEntry {
                doc_count: 3,
                chunk_count: 3,
                last_sync_commit: None,
            },
        );
        let states = vec![live("alpha", "main", 1, None)];
        let report = SyncStateChecker::check(&manifest, &states);
        assert_eq!(report.missing_in_manifest, vec!["alpha@main".to_owned()]);
        assert_eq!(report.missing_in_store, vec!["beta@main".to_owned()]);
    }

    #[test]
    fn invalidate_clears_all_entries() {
        let mut manifest = StateManifest::default();
        manifest.set(
            "alpha",
            "main",
            ManifestEntry {
                doc_count: 1,
                chunk_count: 1,
                last_sync_commit: None,
            },
        );
        manifest.invalidate();
        assert!(manifest.entries.is_empty());
    }
}

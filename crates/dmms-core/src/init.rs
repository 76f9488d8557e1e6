//! Boot-time sanity check tying the state manifest to the live sync-state
//! store (§4.10, scenario S10).
//!
//! Run once when a repository is first opened by the server: load the
//! manifest, compare it against whatever [`SyncStateStore`] already knows,
//! and decide whether it's safe to proceed or whether the caller should
//! surface a warning (or force a re-sync) before doing anything else.

use std::path::Path;

use crate::error::Result;
use crate::manifest::{ManifestEntry, StateManifest, SyncStateChecker, SyncStateReport};
use crate::store::SyncStateStore;

/// Outcome of [`InitCoordinator::check`].
#[derive(Clone, Debug, PartialEq)]
pub struct InitReport {
    /// The loaded (or freshly defaulted) manifest.
    pub manifest: StateManifest,
    /// The comparison against the live sync-state rows.
    pub sync_report: SyncStateReport,
    /// Human-readable warning, if the repository is not safe to sync as-is.
    pub warning: Option<String>,
}

/// Ties [`StateManifest`] and [`SyncStateChecker`] together for the
/// repository-open code path.
pub struct InitCoordinator;

impl InitCoordinator {
    /// Load the manifest at `manifest_path`, compare it against every
    /// sync-state row for `repo`, and return the combined report.
    ///
    /// Never returns an error for an out-of-sync repository — that's a
    /// reportable condition, not a failure. It returns an error only if the
    /// manifest file itself is unreadable/corrupt or newer than this build
    /// supports, or if the sync-state store can't be queried.
    ///
    /// # Errors
    /// Returns an error if the manifest fails to load or the sync-state
    /// query fails.
    pub fn check(manifest_path: &Path, repo: &str, sync_state: &SyncStateStore) -> Result<InitReport> {
        let manifest = StateManifest::load(manifest_path)?;
        let live_states = sync_state.list_all(repo)?;
        let sync_report = SyncStateChecker::check(&manifest, &live_states);
        let warning = SyncStateChecker::out_of_sync_warning(&sync_report);
        Ok(InitReport {
            manifest,
            sync_report,
            warning,
        })
    }

    /// After a sync pass completes cleanly, record the new
    /// `(collection, branch)` position in the manifest and persist it.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be written.
    pub fn record_synced(
        manifest_path: &Path,
        manifest: &mut StateManifest,
        collection: &str,
        branch: &str,
        doc_count: u64,
        chunk_count: u64,
        last_sync_commit: Option<String>,
    ) -> Result<()> {
        manifest.set(
            collection,
            branch,
            ManifestEntry {
                doc_count,
                chunk_count,
                last_sync_commit,
            },
        );
        manifest.save(manifest_path)
    }
}

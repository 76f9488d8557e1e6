//! Composition root for the synchronization core.
//!
//! `dmms-core` defines the domain logic against narrow gateway traits;
//! `dmms-dolt` and `dmms-chroma` implement those traits against a real
//! `dolt` CLI process and a real Chroma store. This crate wires one
//! repository's concrete gateways to [`dmms_core::sync::SyncManager`] and
//! the durable stores it needs, so embedders (the `dmms-server` binary, or
//! an integration test) get one `Repository` instead of assembling the
//! pieces by hand.

use std::path::{Path, PathBuf};

use dmms_chroma::PersistentChromaGateway;
use dmms_core::error::Result;
use dmms_core::init::{InitCoordinator, InitReport};
use dmms_core::manifest::{StateManifest, MANIFEST_RELATIVE_PATH};
use dmms_core::store::{PendingOpStore, SyncStateStore};
use dmms_core::sync::{PullSummary, PushSummary, SyncManager};
use dmms_dolt::{DoltCliGateway, DoltConfig};

pub use dmms_chroma::{HttpChromaGateway, PersistentChromaGateway as EmbeddedChromaGateway};
pub use dmms_core::{chunk, conflict, detect, error, gateway, hash, import, init, manifest, model, sqljson, store, sync, wildcard};
pub use dmms_dolt::DoltCliGateway as Gateway;

/// One repository's gateways and durable stores, wired to a
/// [`SyncManager`] over the embedded (non-HTTP) Chroma backend.
///
/// This is the composition the test suite and the `dmms-server` binary's
/// single-repository mode both reduce to; `dmms-server` additionally
/// supports the HTTP Chroma backend (see its own `ChromaBackend` enum),
/// which this facade does not need since tests drive the embedded store
/// directly.
pub struct Repository {
    /// Logical repository name, used as the key into the durable stores.
    pub name: String,
    /// Default branch.
    pub default_branch: String,
    dolt: DoltCliGateway,
    chroma: PersistentChromaGateway,
    pending: PendingOpStore,
    sync_state: SyncStateStore,
    manifest_path: PathBuf,
}

impl Repository {
    /// Open (or initialize) a repository rooted at `repo_path`, with its
    /// embedded Chroma data under `chroma_data_path` and its durable
    /// tracking stores under `repo_path/.dmms`.
    ///
    /// # Errors
    /// Returns an error if any durable store fails to open.
    pub fn open(name: impl Into<String>, repo_path: &Path, chroma_data_path: &Path) -> Result<Self> {
        let dolt = DoltCliGateway::new(DoltConfig::new(repo_path.to_path_buf()));
        let chroma = PersistentChromaGateway::open(chroma_data_path)?;

        let dmms_dir = repo_path.join(".dmms");
        std::fs::create_dir_all(&dmms_dir)?;
        let tracking_db = dmms_dir.join("deletion_tracking.db");
        let pending = PendingOpStore::open(&tracking_db)?;
        let sync_state = SyncStateStore::open(&tracking_db)?;
        let manifest_path = repo_path.join(MANIFEST_RELATIVE_PATH);

        Ok(Self {
            name: name.into(),
            default_branch: "main".to_owned(),
            dolt,
            chroma,
            pending,
            sync_state,
            manifest_path,
        })
    }

    /// Borrow a [`SyncManager`] over this repository's gateways and stores.
    #[must_use]
    pub fn sync_manager(&self) -> SyncManager<'_, DoltCliGateway, PersistentChromaGateway> {
        SyncManager::new(&self.dolt, &self.chroma, &self.pending, &self.sync_state)
    }

    /// Drain pending operations for `branch` into Dolt and commit them.
    ///
    /// # Errors
    /// Returns an error if the underlying [`SyncManager::push_local_to_vcs`] call fails.
    #[tracing::instrument(skip(self), fields(repo = %self.name, branch))]
    pub fn push(&self, branch: &str) -> Result<PushSummary> {
        self.sync_manager().push_local_to_vcs(&self.name, branch)
    }

    /// Reconcile the vector store against `collection` on `branch`.
    ///
    /// # Errors
    /// Returns an error if the underlying [`SyncManager::pull_vcs_to_local`] call fails.
    #[tracing::instrument(skip(self), fields(repo = %self.name, branch, collection))]
    pub fn pull(&self, collection: &str, branch: &str) -> Result<PullSummary> {
        self.sync_manager().pull_vcs_to_local(&self.name, collection, branch)
    }

    /// Run the boot-time sanity check tying the state manifest to the live
    /// sync-state rows (§4.10).
    ///
    /// # Errors
    /// Returns an error if the manifest can't be loaded or the sync-state
    /// store can't be queried.
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn check_init(&self) -> Result<InitReport> {
        InitCoordinator::check(&self.manifest_path, &self.name, &self.sync_state)
    }

    /// Record a successful sync pass in the on-disk manifest.
    ///
    /// # Errors
    /// Returns an error if the manifest can't be written.
    pub fn record_synced(
        &self,
        manifest: &mut StateManifest,
        collection: &str,
        branch: &str,
        doc_count: u64,
        chunk_count: u64,
        last_sync_commit: Option<String>,
    ) -> Result<()> {
        InitCoordinator::record_synced(
            &self.manifest_path,
            manifest,
            collection,
            branch,
            doc_count,
            chunk_count,
            last_sync_commit,
        )
    }

    /// The Dolt gateway for direct use (diagnostics, tests).
    #[must_use]
    pub const fn dolt(&self) -> &DoltCliGateway {
        &self.dolt
    }

    /// The Chroma gateway for direct use (diagnostics, tests).
    #[must_use]
    pub const fn chroma(&self) -> &PersistentChromaGateway {
        &self.chroma
    }

    /// The pending-operation log for direct use (diagnostics, tests).
    #[must_use]
    pub const fn pending(&self) -> &PendingOpStore {
        &self.pending
    }

    /// The sync-state store for direct use (diagnostics, tests).
    #[must_use]
    pub const fn sync_state(&self) -> &SyncStateStore {
        &self.sync_state
    }
}

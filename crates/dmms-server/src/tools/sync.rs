//! Sync tools (§6): status, stage, full_sync (force flag), init sanity check.

use dmms_core::init::InitCoordinator;
use dmms_core::manifest::SyncStateChecker;
use dmms_core::sync::SyncManager;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::{Deserialize, Serialize};

use super::{map_err, ok_json, DmmsToolServer};

/// Parameters for `sync_status`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SyncStatusParams {}

/// Result of `sync_status`.
#[derive(Debug, Serialize)]
pub struct SyncStatusResult {
    /// `(collection, branch)` pairs whose manifest snapshot disagrees with
    /// the live sync-state rows.
    pub mismatched: Vec<String>,
    /// Pairs the manifest knows about with no matching live row.
    pub missing_in_store: Vec<String>,
    /// Human-readable warning, or `None` if everything agrees.
    pub warning: Option<String>,
}

/// Parameters for `stage_changes`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StageChangesParams {
    /// Branch to stage pending operations against. Defaults to the
    /// repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Result of `stage_changes`.
#[derive(Debug, Serialize)]
pub struct StageChangesResult {
    /// Document operations currently staged (not yet committed).
    pub doc_ops_staged: usize,
    /// Collection operations currently staged (not yet committed).
    pub collection_ops_staged: usize,
}

/// Parameters for `full_sync`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FullSyncParams {
    /// Collection to reconcile VCS-to-local for, after the local-to-VCS push.
    pub collection: String,
    /// Branch to sync. Defaults to the repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
    /// Bypass the "nothing pending" short-circuit and still run a
    /// VCS-to-local reconciliation pass even if nothing was pushed.
    #[serde(default)]
    pub force: bool,
}

/// Result of `full_sync`.
#[derive(Debug, Serialize)]
pub struct FullSyncResult {
    /// Document operations committed during the local-to-VCS push.
    pub doc_ops_committed: usize,
    /// Collection operations committed during the local-to-VCS push.
    pub collection_ops_committed: usize,
    /// Documents upserted into the vector store during the VCS-to-local pull.
    pub upserted: usize,
    /// Documents deleted from the vector store during the VCS-to-local pull.
    pub deleted: usize,
}

#[tool_router(router = sync_tool_router, vis = "pub(crate)")]
impl DmmsToolServer {
    /// Compare the on-disk state manifest against the live sync-state rows
    /// and report whether anything has drifted (§4.10).
    #[tool(description = "Check whether the sync state manifest agrees with the live sync-state store.")]
    pub async fn sync_status(
        &self,
        Parameters(_params): Parameters<SyncStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let report = InitCoordinator::check(&state.manifest_path, &state.repo, &state.sync_state).map_err(map_err)?;

        let mismatched = report
            .sync_report
            .mismatches
            .iter()
            .map(|m| format!("{}@{}", m.collection, m.branch))
            .collect();

        ok_json(&SyncStatusResult {
            mismatched,
            missing_in_store: report.sync_report.missing_in_store.clone(),
            warning: SyncStateChecker::out_of_sync_warning(&report.sync_report),
        })
    }

    /// Report how many document/collection operations are currently staged
    /// (written into the VCS working set, not yet committed).
    #[tool(description = "Report the number of staged, uncommitted document and collection operations.")]
    pub async fn stage_changes(
        &self,
        Parameters(params): Parameters<StageChangesParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());

        let doc_ops_staged = state
            .pending
            .list_doc_ops(&state.repo, &branch, Some(dmms_core::model::OpStatus::Staged))
            .map_err(map_err)?
            .len();
        let collection_ops_staged = state
            .pending
            .list_collection_ops(&state.repo, &branch, Some(dmms_core::model::OpStatus::Staged))
            .map_err(map_err)?
            .len();

        ok_json(&StageChangesResult { doc_ops_staged, collection_ops_staged })
    }

    /// Run a full sync pass: drain pending operations to the VCS and commit
    /// them, then reconcile the vector store against the VCS for one
    /// collection.
    #[tool(description = "Push pending operations to the VCS and pull the resulting state back into the vector store.")]
    pub async fn full_sync(&self, Parameters(params): Parameters<FullSyncParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());
        let manager = SyncManager::new(&state.dolt, &state.chroma, &state.pending, &state.sync_state);

        let push = manager.push_local_to_vcs(&state.repo, &branch).map_err(map_err)?;

        let pull = if push.commit_hash.is_some() || params.force {
            manager.pull_vcs_to_local(&state.repo, &params.collection, &branch).map_err(map_err)?
        } else {
            dmms_core::sync::PullSummary::default()
        };

        ok_json(&FullSyncResult {
            doc_ops_committed: push.doc_ops_committed,
            collection_ops_committed: push.collection_ops_committed,
            upserted: pull.upserted,
            deleted: pull.deleted,
        })
    }
}

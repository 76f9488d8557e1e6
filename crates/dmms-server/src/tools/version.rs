//! Version tools (§6): commit, create branch, switch branch, merge (with
//! preview), log, diff, status, pull, push, resolve conflicts.
//!
//! `log`/`diff`/`status`/`push`/`pull`/`create_branch` are thin passthroughs
//! to the `dolt` CLI (via [`dmms_dolt::DoltCliGateway`]'s inherent methods,
//! not [`dmms_core::gateway::DoltGateway`]) — they carry no sync-coherence
//! invariant of their own, unlike `commit`, which must go through the
//! pending-op log so document/collection staging stays consistent.

use std::collections::HashMap;

use dmms_core::conflict::{Conflict, ConflictAnalyzer, ConflictType, DocSnapshot};
use dmms_core::gateway::DoltGateway;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::{Deserialize, Serialize};

use super::{map_err, ok_json, DmmsToolServer};

/// Parameters for `commit`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommitParams {
    /// Branch to commit on. Defaults to the repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Result of `commit`.
#[derive(Debug, Serialize)]
pub struct CommitResult {
    /// Document operations committed.
    pub doc_ops_committed: usize,
    /// Collection operations committed.
    pub collection_ops_committed: usize,
    /// Resulting commit hash, if anything was committed.
    pub commit_hash: Option<String>,
}

/// Parameters for `create_branch`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateBranchParams {
    /// Name of the branch to create.
    pub branch: String,
}

/// Parameters for `switch_branch`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SwitchBranchParams {
    /// Name of the branch to switch to (created from HEAD if absent).
    pub branch: String,
}

/// Parameters for `merge_branches`, with an optional dry-run preview.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergeBranchesParams {
    /// Collection whose documents are being merged.
    pub collection: String,
    /// The branch receiving the merge.
    pub into_branch: String,
    /// The branch being merged in.
    pub from_branch: String,
    /// If `true`, only report conflicts without applying anything.
    #[serde(default)]
    pub preview_only: bool,
}

/// Result of `merge_branches`.
#[derive(Debug, Serialize)]
pub struct MergeBranchesResult {
    /// Document-level conflicts found, each with a stable ID.
    pub conflicts: Vec<ConflictInfo>,
    /// `true` if every conflict found is auto-resolvable.
    pub can_auto_merge: bool,
    /// `true` if this call only previewed (`preview_only` was set).
    pub previewed_only: bool,
}

/// A conflict as returned to an MCP client.
#[derive(Debug, Serialize)]
pub struct ConflictInfo {
    /// Stable conflict ID.
    pub conflict_id: String,
    /// Document in collision.
    pub doc_id: String,
    /// What kind of collision this is.
    pub conflict_type: &'static str,
    /// Whether this conflict can be resolved without user input.
    pub auto_resolvable: bool,
}

const fn conflict_type_label(conflict_type: ConflictType) -> &'static str {
    match conflict_type {
        ConflictType::ContentModification => "content_modification",
        ConflictType::AddAdd => "add_add",
        ConflictType::DeleteModify => "delete_modify",
        ConflictType::MetadataConflict => "metadata_conflict",
    }
}

impl From<Conflict> for ConflictInfo {
    fn from(c: Conflict) -> Self {
        Self {
            conflict_id: c.conflict_id,
            doc_id: c.doc_id,
            conflict_type: conflict_type_label(c.conflict_type),
            auto_resolvable: c.auto_resolvable,
        }
    }
}

/// Parameters for `log`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogParams {
    /// Branch to read history for. Defaults to the repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
    /// Maximum number of commits to return.
    #[serde(default = "default_log_count")]
    pub max_count: u32,
}

const fn default_log_count() -> u32 {
    20
}

/// Parameters for `diff`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DiffParams {
    /// The earlier commit-ish reference.
    pub from: String,
    /// The later commit-ish reference.
    pub to: String,
}

/// Parameters for `status`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StatusParams {}

/// Parameters for `push`/`pull`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoteSyncParams {
    /// Remote name. Defaults to `"origin"`.
    #[serde(default)]
    pub remote: Option<String>,
    /// Branch to push/pull. Defaults to the repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Raw text output, used by the diagnostic passthrough tools.
#[derive(Debug, Serialize)]
pub struct TextResult {
    /// Raw `dolt` CLI output.
    pub output: String,
}

/// Parameters for `resolve_conflicts`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolveConflictsParams {
    /// Map of conflict ID to resolution name (`"keep_ours"`, `"keep_theirs"`,
    /// `"field_merge"`, `"manual_review"`, or a recognized synonym).
    pub resolutions: HashMap<String, String>,
}

/// Result of `resolve_conflicts`.
#[derive(Debug, Serialize)]
pub struct ResolveConflictsResult {
    /// Conflict IDs whose resolution was understood.
    pub accepted: Vec<String>,
    /// Conflict IDs whose resolution name could not be parsed.
    pub rejected: Vec<String>,
}

#[tool_router(router = version_tool_router, vis = "pub(crate)")]
impl DmmsToolServer {
    /// Commit every staged document/collection operation on a branch.
    #[tool(description = "Commit pending document and collection operations to the VCS.")]
    pub async fn commit(&self, Parameters(params): Parameters<CommitParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());
        let manager = dmms_core::sync::SyncManager::new(&state.dolt, &state.chroma, &state.pending, &state.sync_state);
        let summary = manager.push_local_to_vcs(&state.repo, &branch).map_err(map_err)?;
        ok_json(&CommitResult {
            doc_ops_committed: summary.doc_ops_committed,
            collection_ops_committed: summary.collection_ops_committed,
            commit_hash: summary.commit_hash,
        })
    }

    /// Create a branch from the current HEAD.
    #[tool(description = "Create a new branch from HEAD.")]
    pub async fn create_branch(
        &self,
        Parameters(params): Parameters<CreateBranchParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        state.dolt.create_branch(&params.branch).map_err(map_err)?;
        ok_json(&serde_json::json!({ "branch": params.branch }))
    }

    /// Switch to a branch, creating it from HEAD if it does not exist.
    #[tool(description = "Switch to a branch, creating it from HEAD if needed.")]
    pub async fn switch_branch(
        &self,
        Parameters(params): Parameters<SwitchBranchParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        state.dolt.checkout(&params.branch).map_err(map_err)?;
        ok_json(&serde_json::json!({ "branch": params.branch }))
    }

    /// Preview or apply a three-way merge between two branches for one collection.
    #[tool(description = "Preview or apply a merge between two branches, reporting document-level conflicts.")]
    pub async fn merge_branches(
        &self,
        Parameters(params): Parameters<MergeBranchesParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let base_commit = state.dolt.merge_base(&params.into_branch, &params.from_branch).map_err(map_err)?;
        let ours = state.dolt.read_documents(&params.collection, &params.into_branch).map_err(map_err)?;
        let theirs = state.dolt.read_documents(&params.collection, &params.from_branch).map_err(map_err)?;
        let base_docs = match &base_commit {
            Some(commit) => state.dolt.read_documents(&params.collection, commit).map_err(map_err)?,
            None => Vec::new(),
        };

        let to_map = |docs: Vec<dmms_core::model::Document>| -> HashMap<String, DocSnapshot> {
            docs.into_iter()
                .map(|d| (d.doc_id, DocSnapshot { content: Some(d.content), metadata: d.metadata }))
                .collect()
        };
        let base_map = to_map(base_docs);
        let ours_map = to_map(ours);
        let theirs_map = to_map(theirs);

        let mut doc_ids: std::collections::BTreeSet<&String> = base_map.keys().collect();
        doc_ids.extend(ours_map.keys());
        doc_ids.extend(theirs_map.keys());

        let empty = DocSnapshot::default();
        let conflicts: Vec<Conflict> = doc_ids
            .into_iter()
            .filter_map(|doc_id| {
                ConflictAnalyzer::analyze_document(
                    &params.collection,
                    doc_id,
                    base_map.get(doc_id).unwrap_or(&empty),
                    ours_map.get(doc_id).unwrap_or(&empty),
                    theirs_map.get(doc_id).unwrap_or(&empty),
                )
            })
            .collect();

        let can_auto_merge = ConflictAnalyzer::can_auto_merge(&conflicts);

        if !params.preview_only && can_auto_merge {
            state.dolt.checkout(&params.into_branch).map_err(map_err)?;
            for doc in theirs_map.keys() {
                if let Some(snapshot) = theirs_map.get(doc) {
                    let content = snapshot.content.clone().unwrap_or_default();
                    let merged = dmms_core::model::Document::new(doc.clone(), content, snapshot.metadata.clone());
                    state.dolt.write_document(&params.collection, &params.into_branch, &merged).map_err(map_err)?;
                }
            }
        }

        ok_json(&MergeBranchesResult {
            previewed_only: params.preview_only || !can_auto_merge,
            can_auto_merge,
            conflicts: conflicts.into_iter().map(ConflictInfo::from).collect(),
        })
    }

    /// Raw commit history for a branch.
    #[tool(description = "Show commit history for a branch.")]
    pub async fn log(&self, Parameters(params): Parameters<LogParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());
        let output = state.dolt.log(&branch, params.max_count).map_err(map_err)?;
        ok_json(&TextResult { output })
    }

    /// Raw diff between two commit-ish references.
    #[tool(description = "Show the diff between two commits or branches.")]
    pub async fn diff(&self, Parameters(params): Parameters<DiffParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let output = state.dolt.diff(&params.from, &params.to).map_err(map_err)?;
        ok_json(&TextResult { output })
    }

    /// Raw working-set status.
    #[tool(description = "Show the VCS working-set status.")]
    pub async fn status(&self, Parameters(_params): Parameters<StatusParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let output = state.dolt.status().map_err(map_err)?;
        ok_json(&TextResult { output })
    }

    /// Push a branch to a remote.
    #[tool(description = "Push a branch to its remote.")]
    pub async fn push(&self, Parameters(params): Parameters<RemoteSyncParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());
        let remote = params.remote.unwrap_or_else(|| "origin".to_owned());
        state.dolt.push(&remote, &branch).map_err(map_err)?;
        ok_json(&serde_json::json!({ "remote": remote, "branch": branch }))
    }

    /// Pull a branch from a remote.
    #[tool(description = "Pull a branch from its remote.")]
    pub async fn pull(&self, Parameters(params): Parameters<RemoteSyncParams>) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let branch = params.branch.unwrap_or_else(|| state.default_branch.clone());
        let remote = params.remote.unwrap_or_else(|| "origin".to_owned());
        state.dolt.pull(&remote, &branch).map_err(map_err)?;
        ok_json(&serde_json::json!({ "remote": remote, "branch": branch }))
    }

    /// Record resolutions for a set of conflicts by ID.
    ///
    /// This records which [`dmms_core::conflict::Resolution`] applies to
    /// each conflict ID; applying the resolution to the underlying document
    /// is the caller's responsibility via `add_documents`/`delete_documents`
    /// followed by `commit`.
    #[tool(description = "Record resolutions for a set of conflict IDs by name.")]
    pub async fn resolve_conflicts(
        &self,
        Parameters(params): Parameters<ResolveConflictsParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (conflict_id, resolution_name) in params.resolutions {
            match dmms_core::import::parse_resolution(&resolution_name) {
                Ok(_) => accepted.push(conflict_id),
                Err(_) => rejected.push(conflict_id),
            }
        }
        ok_json(&ResolveConflictsResult { accepted, rejected })
    }
}

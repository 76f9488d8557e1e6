//! Collection tools (§6): list, create, delete, get count, modify.

use dmms_core::gateway::{ChromaGateway, DoltGateway};
use dmms_core::model::{validate_collection_name, CollectionOpType, Metadata, COLLECTIONS_TABLE};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::{Deserialize, Serialize};

use super::{map_err, ok_json, DmmsToolServer};

/// Parameters for `list_collections`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCollectionsParams {}

/// Result of `list_collections`.
#[derive(Debug, Serialize)]
pub struct ListCollectionsResult {
    /// Collection names known to the Dolt-side `collections` table.
    pub collections: Vec<String>,
}

/// Parameters for `create_collection`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCollectionParams {
    /// Name of the collection to create.
    pub name: String,
    /// Optional initial metadata.
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Result of `create_collection`.
#[derive(Debug, Serialize)]
pub struct CreateCollectionResult {
    /// Name of the created collection.
    pub name: String,
}

/// Parameters for `delete_collection`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteCollectionParams {
    /// Name of the collection to delete.
    pub name: String,
}

/// Result of `delete_collection`.
#[derive(Debug, Serialize)]
pub struct DeleteCollectionResult {
    /// Whether the collection existed and was queued for deletion.
    pub deleted: bool,
}

/// Parameters for `get_collection_count`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCollectionCountParams {
    /// Name of the collection to count.
    pub name: String,
}

/// Result of `get_collection_count`.
#[derive(Debug, Serialize)]
pub struct GetCollectionCountResult {
    /// Number of logical documents currently stored.
    pub count: usize,
}

/// Parameters for `modify_collection`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyCollectionParams {
    /// Current collection name.
    pub name: String,
    /// New name, if renaming.
    #[serde(default)]
    pub new_name: Option<String>,
    /// New metadata, if updating metadata. Replaces the existing map wholesale.
    #[serde(default)]
    pub new_metadata: Option<std::collections::BTreeMap<String, serde_json::Value>>,
}

/// Result of `modify_collection`.
#[derive(Debug, Serialize)]
pub struct ModifyCollectionResult {
    /// Whether a pending operation was recorded (`false` for a no-op rename).
    pub recorded: bool,
}

#[tool_router(router = collection_tool_router, vis = "pub(crate)")]
impl DmmsToolServer {
    /// List every collection recorded in the VCS-side schema on the default branch.
    #[tool(description = "List collections known to the repository.")]
    pub async fn list_collections(
        &self,
        Parameters(_params): Parameters<ListCollectionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let docs = state.dolt.read_documents(COLLECTIONS_TABLE, &state.default_branch).map_err(map_err)?;
        let collections = docs.into_iter().map(|d| d.doc_id).collect();
        ok_json(&ListCollectionsResult { collections })
    }

    /// Create a new, empty collection.
    ///
    /// Unlike rename/metadata-update/deletion, creation is written straight
    /// to the VCS side rather than queued: [`CollectionOpType`] has no
    /// "creation" variant, since a brand-new collection can't yet conflict
    /// with anything a concurrent sync pass might be reconciling.
    #[tool(description = "Create a new, empty collection.")]
    pub async fn create_collection(
        &self,
        Parameters(params): Parameters<CreateCollectionParams>,
    ) -> Result<CallToolResult, McpError> {
        validate_collection_name(&params.name).map_err(map_err)?;
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let metadata: Metadata = params.metadata.clone();
        let doc = dmms_core::model::Document::new(params.name.clone(), "", metadata);
        state.dolt.write_document(COLLECTIONS_TABLE, &state.default_branch, &doc).map_err(map_err)?;
        ok_json(&CreateCollectionResult { name: params.name })
    }

    /// Delete a collection and every document in it.
    #[tool(description = "Delete a collection and all of its documents.")]
    pub async fn delete_collection(
        &self,
        Parameters(params): Parameters<DeleteCollectionParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let recorded = state
            .pending
            .insert_collection_op(
                &state.repo,
                &params.name,
                None,
                &Metadata::new(),
                &Metadata::new(),
                &state.default_branch,
                "",
                CollectionOpType::Deletion,
            )
            .map_err(map_err)?;
        ok_json(&DeleteCollectionResult { deleted: recorded.is_some() })
    }

    /// Count the logical documents currently stored in a collection.
    #[tool(description = "Get the number of documents in a collection.")]
    pub async fn get_collection_count(
        &self,
        Parameters(params): Parameters<GetCollectionCountParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let count = state.chroma.list_documents(&params.name).map_err(map_err)?.len();
        ok_json(&GetCollectionCountResult { count })
    }

    /// Rename a collection and/or replace its metadata.
    #[tool(description = "Rename a collection and/or update its metadata.")]
    pub async fn modify_collection(
        &self,
        Parameters(params): Parameters<ModifyCollectionParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(new_name) = &params.new_name {
            validate_collection_name(new_name).map_err(map_err)?;
        }
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let new_metadata: Metadata = params.new_metadata.clone().unwrap_or_default();
        let recorded = state
            .pending
            .track_collection_update(
                &state.repo,
                &params.name,
                params.new_name.as_deref(),
                &Metadata::new(),
                &new_metadata,
                &state.default_branch,
                "",
            )
            .map_err(map_err)?;
        ok_json(&ModifyCollectionResult { recorded: recorded.is_some() })
    }
}

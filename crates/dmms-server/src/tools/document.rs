//! Document tools (§6): add, query, get, delete.

use std::collections::BTreeMap;

use dmms_core::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use dmms_core::gateway::ChromaGateway;
use dmms_core::model::{Document, Metadata};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::{Deserialize, Serialize};

use super::{map_err, ok_json, DmmsToolServer};

/// Parameters for `add_documents`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddDocumentsParams {
    /// Target collection.
    pub collection: String,
    /// Explicit document IDs. Must be the same length as `contents`.
    pub ids: Vec<String>,
    /// Document text, one entry per ID.
    pub contents: Vec<String>,
    /// Optional per-document metadata, same length as `ids` if present.
    #[serde(default)]
    pub metadatas: Option<Vec<BTreeMap<String, serde_json::Value>>>,
}

/// Result of `add_documents`.
#[derive(Debug, Serialize)]
pub struct AddDocumentsResult {
    /// IDs actually written, in input order.
    pub added_ids: Vec<String>,
    /// Total chunk rows written across all added documents.
    pub chunk_count: usize,
}

/// Parameters for `query_documents`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryDocumentsParams {
    /// Collection to search.
    pub collection: String,
    /// Free-text query. Matched by substring against stored content in this
    /// reference implementation (no embedding model is integrated).
    pub query_text: String,
    /// Maximum number of results.
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

const fn default_n_results() -> usize {
    10
}

/// Result of `query_documents`.
#[derive(Debug, Serialize)]
pub struct QueryDocumentsResult {
    /// Matching documents, in the order they were stored.
    pub documents: Vec<DocumentInfo>,
}

/// Parameters for `get_documents`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetDocumentsParams {
    /// Collection to read from.
    pub collection: String,
    /// Explicit document IDs to fetch. If empty, returns every document.
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Result of `get_documents`.
#[derive(Debug, Serialize)]
pub struct GetDocumentsResult {
    /// The documents found (IDs in `ids` with no stored document are
    /// silently omitted, not treated as an error).
    pub documents: Vec<DocumentInfo>,
}

/// A document as returned to an MCP client.
#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    /// Document ID.
    pub doc_id: String,
    /// Full text content.
    pub content: String,
    /// Metadata.
    pub metadata: Metadata,
}

impl From<Document> for DocumentInfo {
    fn from(doc: Document) -> Self {
        Self { doc_id: doc.doc_id, content: doc.content, metadata: doc.metadata }
    }
}

/// Parameters for `delete_documents`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteDocumentsParams {
    /// Collection to delete from.
    pub collection: String,
    /// Document IDs (or chunk IDs — expanded to their base document) to delete.
    pub ids: Vec<String>,
    /// Whether a chunk ID should expand to every chunk of its base document
    /// (on by default, per §6).
    #[serde(default = "default_true")]
    pub expand_base_id: bool,
}

const fn default_true() -> bool {
    true
}

/// Result of `delete_documents`.
#[derive(Debug, Serialize)]
pub struct DeleteDocumentsResult {
    /// Base document IDs actually deleted.
    pub deleted_ids: Vec<String>,
}

#[tool_router(router = document_tool_router, vis = "pub(crate)")]
impl DmmsToolServer {
    /// Add one or more documents to a collection, chunking each per the
    /// configured chunk size/overlap, and recording a pending operation for
    /// each so the next sync pass writes it through to the VCS.
    #[tool(description = "Add documents to a collection by explicit ID, with optional metadata.")]
    pub async fn add_documents(
        &self,
        Parameters(params): Parameters<AddDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.ids.len() != params.contents.len() {
            return Err(McpError::invalid_params("ids and contents must have the same length", None));
        }
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let mut added_ids = Vec::with_capacity(params.ids.len());
        let mut chunk_count = 0usize;
        for (index, (id, content)) in params.ids.iter().zip(params.contents.iter()).enumerate() {
            let metadata: Metadata = params
                .metadatas
                .as_ref()
                .and_then(|m| m.get(index))
                .cloned()
                .unwrap_or_default();
            let doc = Document::new(id.clone(), content.clone(), metadata.clone());
            let ids =
                state.chroma.upsert_document(&params.collection, &doc, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP).map_err(map_err)?;
            chunk_count += ids.len();
            state
                .pending
                .insert_doc_op(&state.repo, id, &params.collection, "", &Metadata::new(), &state.default_branch, "", "tool")
                .map_err(map_err)?;
            added_ids.push(id.clone());
        }

        ok_json(&AddDocumentsResult { added_ids, chunk_count })
    }

    /// Search a collection by free-text content match.
    #[tool(description = "Query documents in a collection by text (substring match against stored content).")]
    pub async fn query_documents(
        &self,
        Parameters(params): Parameters<QueryDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");
        let sources = state.chroma.list_documents(&params.collection).map_err(map_err)?;

        let mut documents = Vec::new();
        for (source_id, _hash) in sources {
            if documents.len() >= params.n_results {
                break;
            }
            let Some(doc) = state.chroma.fetch_document(&params.collection, &source_id).map_err(map_err)? else {
                continue;
            };
            if doc.content.contains(&params.query_text) {
                documents.push(DocumentInfo::from(doc));
            }
        }
        ok_json(&QueryDocumentsResult { documents })
    }

    /// Fetch documents by ID, or every document if none are given.
    #[tool(description = "Get documents by ID, or every document in a collection if no IDs are given.")]
    pub async fn get_documents(
        &self,
        Parameters(params): Parameters<GetDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let doc_ids = if params.ids.is_empty() {
            state.chroma.list_documents(&params.collection).map_err(map_err)?.into_iter().map(|(id, _)| id).collect()
        } else {
            params.ids.clone()
        };

        let mut documents = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            if let Some(doc) = state.chroma.fetch_document(&params.collection, &doc_id).map_err(map_err)? {
                documents.push(DocumentInfo::from(doc));
            }
        }
        ok_json(&GetDocumentsResult { documents })
    }

    /// Delete documents from a collection and queue the deletions for sync.
    #[tool(description = "Delete documents by ID from a collection. Chunk IDs expand to their base document by default.")]
    pub async fn delete_documents(
        &self,
        Parameters(params): Parameters<DeleteDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let base_ids: Vec<String> = if params.expand_base_id {
            params.ids.iter().map(|id| dmms_core::hash::base_id(id)).collect::<std::collections::HashSet<_>>().into_iter().collect()
        } else {
            params.ids.clone()
        };

        let mut deleted_ids = Vec::with_capacity(base_ids.len());
        for base_id in base_ids {
            state.chroma.delete_document(&params.collection, &base_id).map_err(map_err)?;
            state
                .pending
                .insert_doc_op(&state.repo, &base_id, &params.collection, "", &Metadata::new(), &state.default_branch, "", "tool")
                .map_err(map_err)?;
            deleted_ids.push(base_id);
        }
        ok_json(&DeleteDocumentsResult { deleted_ids })
    }
}

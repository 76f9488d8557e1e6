//! Import tools (§6): preview and execute a cross-repository import.

use std::collections::HashMap;

use dmms_core::gateway::{ChromaGateway, DoltGateway};
use dmms_core::import::{
    ExpandedImportMapping, ImportBatch, ImportConflictType, ImportEngine, ImportFilterSpec, ImportResolution,
};
use dmms_core::model::{Document, Metadata, COLLECTIONS_TABLE};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::{Deserialize, Serialize};

use super::{map_err, ok_json, DmmsToolServer};
use crate::state::RepoState;

/// One source-to-target mapping in an import call (§4.8 step 1).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImportFilterSpecParams {
    /// Source collection name or `*`-pattern.
    pub name: String,
    /// Target collection this source feeds.
    pub import_into: String,
    /// Optional document-ID patterns narrowing which documents are pulled.
    #[serde(default)]
    pub documents: Option<Vec<String>>,
}

impl From<ImportFilterSpecParams> for ImportFilterSpec {
    fn from(params: ImportFilterSpecParams) -> Self {
        Self {
            name: params.name,
            import_into: params.import_into,
            documents: params.documents,
        }
    }
}

/// Parameters shared by `preview_import` and `execute_import`: which source
/// collections (wildcards allowed) feed which target(s). An empty list
/// imports every collection into itself.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImportFiltersParams {
    /// Source-to-target mappings.
    #[serde(default)]
    pub filters: Vec<ImportFilterSpecParams>,
}

/// Result of `preview_import`.
#[derive(Debug, Serialize)]
pub struct PreviewImportResult {
    /// Source collections the filters matched.
    pub matched_sources: Vec<String>,
    /// Target collections covered by this preview.
    pub target_collections: Vec<String>,
    /// Document IDs that can be imported with no collision, by target.
    pub clean_doc_ids: HashMap<String, Vec<String>>,
    /// Collisions that need a resolution before executing.
    pub conflicts: Vec<ImportConflictInfo>,
}

/// An import collision as returned to an MCP client.
#[derive(Debug, Serialize)]
pub struct ImportConflictInfo {
    /// Stable conflict ID (`imp_` or `xc_` prefixed).
    pub conflict_id: String,
    /// The document ID in collision (empty for a collection-level mismatch).
    pub doc_id: String,
    /// The target collection the import is writing into.
    pub target_collection: String,
    /// Source collection(s) contributing a colliding version.
    pub source_collections: Vec<String>,
    /// Classification of the collision.
    #[serde(rename = "type")]
    pub conflict_type: ImportConflictType,
    /// `true` if this collides with something already present in the target.
    pub against_existing_target: bool,
}

impl From<dmms_core::import::ImportConflict> for ImportConflictInfo {
    fn from(c: dmms_core::import::ImportConflict) -> Self {
        Self {
            conflict_id: c.conflict_id,
            doc_id: c.doc_id,
            target_collection: c.target_collection,
            source_collections: c.source_collections,
            conflict_type: c.conflict_type,
            against_existing_target: c.against_existing_target,
        }
    }
}

/// Parameters for `execute_import`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteImportParams {
    /// Source-to-target mappings.
    #[serde(default)]
    pub filters: Vec<ImportFilterSpecParams>,
    /// Resolution (by name, see [`dmms_core::import::parse_resolution`]) for
    /// each conflict ID the caller has already decided on.
    #[serde(default)]
    pub resolutions: HashMap<String, String>,
}

/// Result of `execute_import`.
#[derive(Debug, Serialize)]
pub struct ExecuteImportResult {
    /// Document IDs actually written, by target collection.
    pub imported_ids: HashMap<String, Vec<String>>,
    /// Conflicts that still have no resolution and were left untouched.
    pub still_unresolved: Vec<ImportConflictInfo>,
}

#[tool_router(router = import_tool_router, vis = "pub(crate)")]
impl DmmsToolServer {
    /// Preview a cross-repository import: expand the filters, read every
    /// matched collection, and report what would import cleanly versus what
    /// collides, grouped by target collection (so one call can cover, say,
    /// `archive_*` into `consolidated` alongside `current` into `active`).
    #[tool(description = "Preview a cross-collection import, reporting conflicts without writing anything.")]
    pub async fn preview_import(
        &self,
        Parameters(params): Parameters<ImportFiltersParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let mappings = expand_mappings(&state, params.filters).map_err(map_err)?;
        let matched_sources = {
            let mut sources: Vec<String> = mappings.iter().map(|m| m.source_collection.clone()).collect();
            sources.sort();
            sources.dedup();
            sources
        };
        let target_collections = ImportEngine::target_collections(&mappings);

        let mut clean_doc_ids = HashMap::new();
        let mut conflicts = Vec::new();
        for target in &target_collections {
            let batches = load_batches(&state, &mappings, target).map_err(map_err)?;
            let existing = load_existing(&state, target).map_err(map_err)?;
            let existing_metadata = collection_metadata(&state, target).map_err(map_err)?;

            let preview = ImportEngine::preview(target, &batches, &existing, existing_metadata.as_ref());
            clean_doc_ids.insert(
                target.clone(),
                preview.clean.iter().map(|(_, doc)| doc.doc_id.clone()).collect(),
            );
            conflicts.extend(preview.conflicts.into_iter().map(ImportConflictInfo::from));
        }

        ok_json(&PreviewImportResult {
            matched_sources,
            target_collections,
            clean_doc_ids,
            conflicts,
        })
    }

    /// Execute a cross-repository import, applying any resolutions the
    /// caller already supplied and writing resolved documents into each
    /// target collection (queued through the pending-op log like any other
    /// write, per §6).
    #[tool(description = "Execute a cross-collection import, applying supplied conflict resolutions.")]
    pub async fn execute_import(
        &self,
        Parameters(params): Parameters<ExecuteImportParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.repo.lock().expect("repo state mutex poisoned");

        let mut resolutions: HashMap<String, ImportResolution> = HashMap::new();
        for (conflict_id, name) in &params.resolutions {
            let resolution = dmms_core::import::parse_resolution(name).map_err(map_err)?;
            resolutions.insert(conflict_id.clone(), resolution);
        }

        let mappings = expand_mappings(&state, params.filters).map_err(map_err)?;
        let target_collections = ImportEngine::target_collections(&mappings);

        let mut imported_ids: HashMap<String, Vec<String>> = HashMap::new();
        let mut still_unresolved = Vec::new();

        for target in &target_collections {
            let batches = load_batches(&state, &mappings, target).map_err(map_err)?;
            let existing = load_existing(&state, target).map_err(map_err)?;
            let existing_metadata = collection_metadata(&state, target).map_err(map_err)?;

            let preview = ImportEngine::preview(target, &batches, &existing, existing_metadata.as_ref());
            let result = ImportEngine::execute(&preview, &batches, &existing, &resolutions);

            let mut ids = Vec::with_capacity(result.imported.len());
            for doc in &result.imported {
                state
                    .chroma
                    .upsert_document(
                        target,
                        doc,
                        dmms_core::chunk::DEFAULT_CHUNK_SIZE,
                        dmms_core::chunk::DEFAULT_OVERLAP,
                    )
                    .map_err(map_err)?;
                state
                    .pending
                    .insert_doc_op(
                        &state.repo,
                        &doc.doc_id,
                        target,
                        "",
                        &Metadata::new(),
                        &state.default_branch,
                        "",
                        "import",
                    )
                    .map_err(map_err)?;
                ids.push(doc.doc_id.clone());
            }
            imported_ids.insert(target.clone(), ids);
            still_unresolved.extend(result.still_unresolved.into_iter().map(ImportConflictInfo::from));
        }

        ok_json(&ExecuteImportResult {
            imported_ids,
            still_unresolved,
        })
    }
}

fn expand_mappings(
    state: &RepoState,
    filters: Vec<ImportFilterSpecParams>,
) -> dmms_core::error::Result<Vec<ExpandedImportMapping>> {
    let available = state.dolt.read_documents(COLLECTIONS_TABLE, &state.default_branch)?;
    let available_names: Vec<&str> = available.iter().map(|d| d.doc_id.as_str()).collect();
    let specs: Vec<ImportFilterSpec> = filters.into_iter().map(ImportFilterSpec::from).collect();
    Ok(ImportEngine::expand_filter_specs(&available_names, &specs))
}

fn load_batches(
    state: &RepoState,
    mappings: &[ExpandedImportMapping],
    target: &str,
) -> dmms_core::error::Result<Vec<ImportBatch>> {
    mappings
        .iter()
        .filter(|m| m.import_into == target)
        .map(|mapping| -> dmms_core::error::Result<ImportBatch> {
            let ids = state.chroma.list_documents(&mapping.source_collection)?;
            let doc_patterns: Option<Vec<&str>> =
                mapping.documents.as_ref().map(|ps| ps.iter().map(String::as_str).collect());

            let mut documents = Vec::with_capacity(ids.len());
            for (doc_id, _hash) in ids {
                if let Some(patterns) = &doc_patterns {
                    if !patterns.iter().any(|p| dmms_core::wildcard::matches(p, &doc_id)) {
                        continue;
                    }
                }
                if let Some(doc) = state.chroma.fetch_document(&mapping.source_collection, &doc_id)? {
                    documents.push(doc);
                }
            }

            let metadata = collection_metadata(state, &mapping.source_collection)?.unwrap_or_default();
            Ok(ImportBatch {
                source_collection: mapping.source_collection.clone(),
                metadata,
                documents,
            })
        })
        .collect()
}

fn load_existing(state: &RepoState, target_collection: &str) -> dmms_core::error::Result<HashMap<String, Document>> {
    let ids = state.chroma.list_documents(target_collection)?;
    let mut out = HashMap::with_capacity(ids.len());
    for (doc_id, _hash) in ids {
        if let Some(doc) = state.chroma.fetch_document(target_collection, &doc_id)? {
            out.insert(doc_id, doc);
        }
    }
    Ok(out)
}

fn collection_metadata(state: &RepoState, name: &str) -> dmms_core::error::Result<Option<Metadata>> {
    let docs = state.dolt.read_documents(COLLECTIONS_TABLE, &state.default_branch)?;
    Ok(docs.into_iter().find(|d| d.doc_id == name).map(|d| d.metadata))
}

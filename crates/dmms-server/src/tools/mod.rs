//! Typed request/response shapes for every MCP tool category (§6), and the
//! `DmmsToolServer` they're implemented on.
//!
//! JSON-RPC framing is out of scope (handled entirely by `rmcp`'s transport
//! layer in `main.rs`); this module only defines what each tool accepts and
//! returns and what it does against [`crate::state::AppState`].

pub mod collection;
pub mod document;
pub mod import;
pub mod sync;
pub mod version;

use std::sync::Arc;

use dmms_core::error::DmmsError;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool_handler, ErrorData as McpError, ServerHandler};
use serde::Serialize;

use crate::state::AppState;

/// The MCP tool server. Holds shared state and the combined tool router
/// assembled in `new()` from each category's `#[tool_router]` impl.
#[derive(Clone)]
pub struct DmmsToolServer {
    pub(crate) state: Arc<AppState>,
    pub(crate) tool_router: rmcp::handler::server::router::tool::ToolRouter<Self>,
}

impl DmmsToolServer {
    /// Build a server over `state`, wiring up every tool category's router.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        let tool_router = Self::collection_tool_router()
            + Self::document_tool_router()
            + Self::version_tool_router()
            + Self::sync_tool_router()
            + Self::import_tool_router();
        Self { state, tool_router }
    }
}

#[tool_handler]
impl ServerHandler for DmmsToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Keeps a Chroma vector store and a Dolt version-controlled store in sync. \
                 Use the collection/document tools to stage changes, then sync_status/full_sync \
                 to reconcile, and the version tools to branch, merge, and resolve conflicts."
                    .to_owned(),
            ),
        }
    }
}

/// Serialize `value` as the single content item of a successful tool result.
pub(crate) fn ok_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let content = Content::json(value).map_err(|err| McpError::internal_error(err.to_string(), None))?;
    Ok(CallToolResult::success(vec![content]))
}

/// Map a [`DmmsError`] to the closest `rmcp` error category.
pub(crate) fn map_err(err: DmmsError) -> McpError {
    match err {
        DmmsError::NotFound { .. } | DmmsError::AlreadyExists { .. } | DmmsError::Validation { .. } => {
            McpError::invalid_params(err.to_string(), None)
        }
        other => McpError::internal_error(other.to_string(), None),
    }
}

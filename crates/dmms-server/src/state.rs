//! Shared server state: the configured gateways plus the durable stores,
//! all behind one mutex so mutating tool calls are serialized per the
//! single-owner-actor pattern (§5, §9).

use std::path::PathBuf;
use std::sync::Mutex;

use dmms_chroma::{HttpChromaGateway, PersistentChromaGateway};
use dmms_core::chunk::ChunkLookup;
use dmms_core::error::{DmmsError, Result};
use dmms_core::gateway::ChromaGateway;
use dmms_core::model::Document;
use dmms_core::store::{PendingOpStore, SyncStateStore};
use dmms_dolt::DoltCliGateway;

use crate::config::{ChromaMode, DmmsConfig};

/// One of the two `ChromaGateway` backends, selected by `CHROMA_MODE`.
///
/// Enum dispatch (rather than `Box<dyn ChromaGateway>`) keeps the gateway
/// `Send` without requiring its inner client to be `Sync`; the surrounding
/// `Mutex<RepoState>` already serializes access.
pub enum ChromaBackend {
    /// `CHROMA_MODE=persistent`.
    Persistent(PersistentChromaGateway),
    /// `CHROMA_MODE=server`.
    Http(HttpChromaGateway),
}

impl ChunkLookup for ChromaBackend {
    fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>> {
        match self {
            Self::Persistent(g) => g.ids_with_source(collection, source_id),
            Self::Http(g) => g.ids_with_source(collection, source_id),
        }
    }
}

impl ChromaGateway for ChromaBackend {
    fn upsert_document(
        &self,
        collection: &str,
        doc: &Document,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>> {
        match self {
            Self::Persistent(g) => g.upsert_document(collection, doc, chunk_size, overlap),
            Self::Http(g) => g.upsert_document(collection, doc, chunk_size, overlap),
        }
    }

    fn delete_document(&self, collection: &str, base_id: &str) -> Result<()> {
        match self {
            Self::Persistent(g) => g.delete_document(collection, base_id),
            Self::Http(g) => g.delete_document(collection, base_id),
        }
    }

    fn fetch_document(&self, collection: &str, doc_id: &str) -> Result<Option<Document>> {
        match self {
            Self::Persistent(g) => g.fetch_document(collection, doc_id),
            Self::Http(g) => g.fetch_document(collection, doc_id),
        }
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<(String, String)>> {
        match self {
            Self::Persistent(g) => g.list_documents(collection),
            Self::Http(g) => g.list_documents(collection),
        }
    }
}

impl ChromaBackend {
    fn from_config(config: &DmmsConfig) -> Result<Self> {
        match config.chroma_mode {
            ChromaMode::Persistent => {
                Ok(Self::Persistent(PersistentChromaGateway::open(&config.chroma_data_path)?))
            }
            ChromaMode::Server => {
                let base_url = format!("http://{}:{}", config.chroma_host, config.chroma_port);
                Ok(Self::Http(HttpChromaGateway::new(base_url)?))
            }
        }
    }
}

/// Everything a tool call needs to act against one repository.
pub struct RepoState {
    /// Logical repository name, used as the `repo` key into the pending-op
    /// and sync-state stores.
    pub repo: String,
    /// Default branch for calls that don't specify one.
    pub default_branch: String,
    /// Dolt gateway for this repository.
    pub dolt: DoltCliGateway,
    /// Chroma gateway for this repository.
    pub chroma: ChromaBackend,
    /// Durable pending-operation log.
    pub pending: PendingOpStore,
    /// Durable sync-state store.
    pub sync_state: SyncStateStore,
    /// Path to the on-disk state manifest (§4.10).
    pub manifest_path: PathBuf,
}

impl RepoState {
    /// Build repository state from `config`, opening (and migrating) every
    /// durable store it names.
    ///
    /// # Errors
    /// Returns an error if any store fails to open or the configured Chroma
    /// gateway fails to construct.
    pub fn from_config(config: &DmmsConfig) -> Result<Self> {
        let chroma = ChromaBackend::from_config(config)?;
        let dolt = DoltCliGateway::new(dmms_dolt::DoltConfig {
            repo_path: config.dolt_repository_path.clone(),
            dolt_binary: config.dolt_executable_path.clone(),
            timeout: config.dolt_command_timeout,
        });
        let tracking_db = config.dolt_repository_path.join(".dmms").join("deletion_tracking.db");
        if let Some(parent) = tracking_db.parent() {
            std::fs::create_dir_all(parent).map_err(DmmsError::from)?;
        }
        let pending = PendingOpStore::open(&tracking_db)?;
        let sync_state = SyncStateStore::open(&tracking_db)?;
        let manifest_path = config.dolt_repository_path.join(".dmms").join("state.json");

        Ok(Self {
            repo: config.dolt_repository_path.display().to_string(),
            default_branch: "main".to_owned(),
            dolt,
            chroma,
            pending,
            sync_state,
            manifest_path,
        })
    }
}

/// Top-level shared state, held behind a single mutex per §5/§9: one logical
/// repository is served per process, and mutating tool calls acquire this
/// lock for their whole duration.
pub struct AppState {
    /// The guarded repository state.
    pub repo: Mutex<RepoState>,
}

impl AppState {
    /// Build shared state from `config`.
    ///
    /// # Errors
    /// Returns an error if [`RepoState::from_config`] fails.
    pub fn from_config(config: &DmmsConfig) -> Result<Self> {
        Ok(Self { repo: Mutex::new(RepoState::from_config(config)?) })
    }
}

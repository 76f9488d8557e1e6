//! HTTP-backed Chroma gateway, for a separately-running Chroma server.
//!
//! Uses `reqwest`'s blocking client rather than async: every other gateway
//! in this workspace (`dmms-dolt`'s CLI calls, the SQLite-backed stores) is
//! synchronous, and `ChromaGateway` is a plain synchronous trait so
//! `SyncManager` stays generic without an async runtime dependency.

use std::time::Duration;

use dmms_core::chunk::{chunk_content, chunk_id, ChunkLookup};
use dmms_core::error::{DmmsError, Result};
use dmms_core::gateway::ChromaGateway;
use dmms_core::hash::base_id;
use dmms_core::model::{Document, Metadata};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Request body for Chroma's `POST /collections/{name}/add`.
#[derive(Serialize)]
struct AddRequest<'a> {
    ids: Vec<&'a str>,
    documents: Vec<&'a str>,
    metadatas: Vec<serde_json::Value>,
}

/// Request body for Chroma's `POST /collections/{name}/get`.
#[derive(Serialize)]
struct GetRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#where: Option<serde_json::Value>,
}

/// Response body shared by `get`-style Chroma endpoints.
#[derive(Deserialize, Default)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<serde_json::Value>>,
}

/// Request body for Chroma's `POST /collections/{name}/delete`.
#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: Vec<&'a str>,
}

/// [`ChromaGateway`] implementation that talks to a running Chroma server
/// over its HTTP API.
pub struct HttpChromaGateway {
    client: Client,
    base_url: String,
}

impl HttpChromaGateway {
    /// Build a gateway pointed at `base_url` (e.g. `http://localhost:8000/api/v1`)
    /// with a 30 second request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| DmmsError::Internal {
                detail: format!("failed to build Chroma HTTP client: {err}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn collection_url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{collection}/{suffix}", self.base_url)
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| DmmsError::ExternalCommandFailed {
                command: format!("POST {url}"),
                stderr: err.to_string(),
                exit_code: None,
            })?;
        if !response.status().is_success() {
            return Err(DmmsError::ExternalCommandFailed {
                command: format!("POST {url}"),
                stderr: response.text().unwrap_or_default(),
                exit_code: None,
            });
        }
        response.json().map_err(|err| DmmsError::Internal {
            detail: format!("malformed Chroma response from {url}: {err}"),
        })
    }

    fn get_by_source(&self, collection: &str, source_id: &str) -> Result<GetResponse> {
        let request = GetRequest {
            ids: None,
            r#where: Some(serde_json::json!({ "source_id": source_id })),
        };
        self.post(&self.collection_url(collection, "get"), &request)
    }
}

impl ChunkLookup for HttpChromaGateway {
    fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>> {
        Ok(self.get_by_source(collection, source_id)?.ids)
    }
}

impl ChromaGateway for HttpChromaGateway {
    fn upsert_document(
        &self,
        collection: &str,
        doc: &Document,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>> {
        self.delete_document(collection, &doc.doc_id)?;

        let chunks = chunk_content(&doc.content, chunk_size, overlap);
        let ids: Vec<String> = (0..chunks.len()).map(|i| chunk_id(&doc.doc_id, i, chunks.len())).collect();

        let mut metadata = doc.metadata.clone();
        metadata.insert("source_id".to_owned(), serde_json::Value::String(doc.doc_id.clone()));
        let metadata_value = serde_json::to_value(&metadata)?;

        let request = AddRequest {
            ids: ids.iter().map(String::as_str).collect(),
            documents: chunks.iter().map(String::as_str).collect(),
            metadatas: chunks.iter().map(|_| metadata_value.clone()).collect(),
        };
        let _: serde_json::Value = self.post(&self.collection_url(collection, "add"), &request)?;
        Ok(ids)
    }

    fn delete_document(&self, collection: &str, base_id_or_chunk: &str) -> Result<()> {
        let base = base_id(base_id_or_chunk);
        let existing = self.get_by_source(collection, &base)?;
        if existing.ids.is_empty() {
            return Ok(());
        }
        let request = DeleteRequest {
            ids: existing.ids.iter().map(String::as_str).collect(),
        };
        let _: serde_json::Value = self.post(&self.collection_url(collection, "delete"), &request)?;
        Ok(())
    }

    fn fetch_document(&self, collection: &str, doc_id: &str) -> Result<Option<Document>> {
        let base = base_id(doc_id);
        let response = self.get_by_source(collection, &base)?;
        if response.ids.is_empty() {
            return Ok(None);
        }
        let content = response
            .documents
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("");
        let metadata: Metadata = response
            .metadatas
            .first()
            .and_then(Option::clone)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Ok(Some(Document::new(base, content, metadata)))
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<(String, String)>> {
        let request = GetRequest {
            ids: None,
            r#where: None,
        };
        let response: GetResponse = self.post(&self.collection_url(collection, "get"), &request)?;
        let mut by_source: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        for (id, document) in response.ids.iter().zip(response.documents.iter()) {
            let source = base_id(id);
            let hash = document
                .as_deref()
                .map(dmms_core::hash::content_hash)
                .unwrap_or_default();
            by_source.insert(source, hash);
        }
        Ok(by_source.into_iter().collect())
    }
}

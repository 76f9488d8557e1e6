//! Embedded SQLite-backed Chroma gateway, for local/single-process use.
//!
//! Chroma's own "persistent client" mode stores its index on local disk;
//! this gateway plays the same role for the sync core's tests and for
//! servers that don't need a separately-running Chroma process. It stores
//! one row per stored chunk (not per logical document), mirroring how a real
//! vector store indexes chunks independently.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use dmms_core::chunk::{chunk_content, chunk_id, ChunkLookup};
use dmms_core::error::Result;
use dmms_core::gateway::ChromaGateway;
use dmms_core::hash::base_id;
use dmms_core::model::{Document, Metadata};

/// [`ChromaGateway`] implementation backed by an embedded SQLite database.
pub struct PersistentChromaGateway {
    conn: Connection,
}

impl PersistentChromaGateway {
    /// Open (creating if absent) the persistent store at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let gateway = Self { conn };
        gateway.migrate()?;
        Ok(gateway)
    }

    /// Open an in-memory database, primarily for tests.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created or migrated.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let gateway = Self { conn };
        gateway.migrate()?;
        Ok(gateway)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                PRIMARY KEY (collection, chunk_id)
             );
             CREATE INDEX IF NOT EXISTS idx_chunks_source
                ON chunks (collection, source_id);",
        )?;
        Ok(())
    }
}

impl ChunkLookup for PersistentChromaGateway {
    fn ids_with_source(&self, collection: &str, source_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id FROM chunks WHERE collection = ?1 AND source_id = ?2 ORDER BY chunk_id",
        )?;
        let rows = stmt
            .query_map(params![collection, source_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }
}

impl ChromaGateway for PersistentChromaGateway {
    fn upsert_document(
        &self,
        collection: &str,
        doc: &Document,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>> {
        self.delete_document(collection, &doc.doc_id)?;

        let chunks = chunk_content(&doc.content, chunk_size, overlap);
        let metadata_json = serde_json::to_string(&doc.metadata)?;
        let mut ids = Vec::with_capacity(chunks.len());

        for (index, chunk_text) in chunks.iter().enumerate() {
            let id = chunk_id(&doc.doc_id, index, chunks.len());
            self.conn.execute(
                "INSERT INTO chunks (collection, chunk_id, source_id, content, metadata, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, chunk_id) DO UPDATE SET
                    source_id = excluded.source_id,
                    content = excluded.content,
                    metadata = excluded.metadata,
                    content_hash = excluded.content_hash",
                params![collection, id, doc.doc_id, chunk_text, metadata_json, doc.content_hash],
            )?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_document(&self, collection: &str, base_id_or_chunk: &str) -> Result<()> {
        let base = base_id(base_id_or_chunk);
        self.conn.execute(
            "DELETE FROM chunks WHERE collection = ?1 AND source_id = ?2",
            params![collection, base],
        )?;
        Ok(())
    }

    fn fetch_document(&self, collection: &str, doc_id: &str) -> Result<Option<Document>> {
        let base = base_id(doc_id);
        let mut stmt = self.conn.prepare(
            "SELECT content, metadata, content_hash FROM chunks
             WHERE collection = ?1 AND source_id = ?2 ORDER BY chunk_id",
        )?;
        let rows = stmt
            .query_map(params![collection, base], |row| {
                let content: String = row.get(0)?;
                let metadata: String = row.get(1)?;
                Ok((content, metadata))
            })?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

        if rows.is_empty() {
            return Ok(None);
        }
        let content = rows.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>().join("");
        let metadata_value: serde_json::Value = serde_json::from_str(&rows[0].1)?;
        let metadata: Metadata = serde_json::from_value(metadata_value)?;
        Ok(Some(Document::new(base, content, metadata)))
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, content_hash FROM chunks WHERE collection = ?1
             GROUP BY source_id ORDER BY source_id",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                let id: String = row.get(0)?;
                let hash: String = row.get(1)?;
                Ok((id, hash))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_small_doc_gets_single_unsuffixed_id() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        let doc = Document::new("doc1", "small content", Metadata::new());
        let ids = gateway.upsert_document("alpha", &doc, 512, 50).unwrap();
        assert_eq!(ids, vec!["doc1".to_owned()]);
    }

    #[test]
    fn upsert_large_doc_gets_suffixed_chunk_ids() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        let doc = Document::new("doc2", &"A".repeat(800), Metadata::new());
        let ids = gateway.upsert_document("alpha", &doc, 512, 50).unwrap();
        assert!(ids.len() >= 2);
        assert_eq!(ids[0], "doc2_chunk_0");
    }

    #[test]
    fn ids_with_source_resolves_base_to_chunks() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        let doc = Document::new("doc2", &"A".repeat(800), Metadata::new());
        gateway.upsert_document("alpha", &doc, 512, 50).unwrap();
        let ids = gateway.ids_with_source("alpha", "doc2").unwrap();
        assert!(ids.len() >= 2);
    }

    #[test]
    fn re_upsert_replaces_rather_than_duplicates() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        let doc = Document::new("doc1", "v1", Metadata::new());
        gateway.upsert_document("alpha", &doc, 512, 50).unwrap();
        let doc2 = Document::new("doc1", "v2", Metadata::new());
        gateway.upsert_document("alpha", &doc2, 512, 50).unwrap();
        let docs = gateway.list_documents("alpha").unwrap();
        assert_eq!(docs.len(), 1);
        let fetched = gateway.fetch_document("alpha", "doc1").unwrap().unwrap();
        assert_eq!(fetched.content, "v2");
    }

    #[test]
    fn delete_document_removes_all_its_chunks() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        let doc = Document::new("doc2", &"A".repeat(800), Metadata::new());
        gateway.upsert_document("alpha", &doc, 512, 50).unwrap();
        gateway.delete_document("alpha", "doc2").unwrap();
        assert!(gateway.fetch_document("alpha", "doc2").unwrap().is_none());
    }

    #[test]
    fn fetch_missing_document_is_none() {
        let gateway = PersistentChromaGateway::open_in_memory().unwrap();
        assert!(gateway.fetch_document("alpha", "ghost").unwrap().is_none());
    }
}

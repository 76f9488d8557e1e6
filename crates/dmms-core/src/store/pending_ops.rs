//! Durable log of local mutations not yet reflected in the VCS (§4.2).
//!
//! Backed by an embedded SQLite database, one file per repository. Every
//! document or collection mutation made through the sync core's tools is
//! recorded here before it touches the vector store, so a crash between "we
//! told Chroma" and "we told Dolt" leaves a recoverable trail rather than a
//! silently dropped change.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DmmsError, Result};
use crate::model::{CollectionOpType, Metadata, OpStatus, PendingCollectionOp, PendingDocOp};
use crate::store::migrations::{plan_migrations, CURRENT_SCHEMA_VERSION};

/// Durable store for pending document- and collection-level operations.
pub struct PendingOpStore {
    conn: Connection,
}

impl PendingOpStore {
    /// Open (creating if absent) the pending-op database at `path`, applying
    /// any outstanding migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database, primarily for tests.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created or migrated.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)",
        )?;
        let found: i64 = self
            .conn
            .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);

        for action in plan_migrations(found) {
            for statement in &action.statements {
                self.conn.execute_batch(statement)?;
            }
            self.conn
                .execute("DELETE FROM schema_meta", [])?;
            self.conn.execute(
                "INSERT INTO schema_meta (version) VALUES (?1)",
                params![action.to_version],
            )?;
        }

        let final_version: i64 = self
            .conn
            .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);
        if final_version > CURRENT_SCHEMA_VERSION {
            return Err(DmmsError::SchemaMigrationRequired {
                found_version: final_version,
                expected_version: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Record a pending document operation.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_doc_op(
        &self,
        repo: &str,
        doc_id: &str,
        collection: &str,
        original_content_hash: &str,
        original_metadata: &Metadata,
        branch: &str,
        base_commit: &str,
        source: &str,
    ) -> Result<i64> {
        let now = Utc::now();
        let metadata_json = serde_json::to_string(original_metadata)?;
        self.conn.execute(
            "INSERT INTO pending_doc_ops
                (repo, doc_id, collection, original_content_hash, original_metadata,
                 branch, base_commit, source, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                repo,
                doc_id,
                collection,
                original_content_hash,
                metadata_json,
                branch,
                base_commit,
                source,
                OpStatus::Pending.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Record a pending rename and/or metadata update on a collection,
    /// inferring the operation type from whether `new_name` actually differs
    /// from `original_name` (§4.2).
    ///
    /// Returns `None` (no row written) if `new_name` is absent or equal to
    /// `original_name` and the metadata is unchanged — a true no-op.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    #[allow(clippy::too_many_arguments)]
    pub fn track_collection_update(
        &self,
        repo: &str,
        original_name: &str,
        new_name: Option<&str>,
        original_metadata: &Metadata,
        new_metadata: &Metadata,
        branch: &str,
        base_commit: &str,
    ) -> Result<Option<i64>> {
        let renamed = new_name.is_some_and(|n| n != original_name);
        if !renamed && original_metadata == new_metadata {
            return Ok(None);
        }
        let operation_type = if renamed {
            CollectionOpType::Rename
        } else {
            CollectionOpType::MetadataUpdate
        };
        self.insert_collection_op(
            repo,
            original_name,
            new_name,
            original_metadata,
            new_metadata,
            branch,
            base_commit,
            operation_type,
        )
    }

    /// Record a pending collection operation.
    ///
    /// Per §4.2, a rename that leaves both the name and metadata unchanged
    /// (a no-op rename) is never recorded — there is nothing for the VCS side
    /// to apply.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_collection_op(
        &self,
        repo: &str,
        collection_name: &str,
        new_name: Option<&str>,
        original_metadata: &Metadata,
        new_metadata: &Metadata,
        branch: &str,
        base_commit: &str,
        operation_type: CollectionOpType,
    ) -> Result<Option<i64>> {
        if operation_type == CollectionOpType::Rename
            && new_name.is_some_and(|n| n == collection_name)
            && original_metadata == new_metadata
        {
            return Ok(None);
        }

        let original_json = serde_json::to_string(original_metadata)?;
        let new_json = serde_json::to_string(new_metadata)?;
        self.conn.execute(
            "INSERT INTO pending_collection_ops
                (repo, collection_name, new_name, original_metadata, new_metadata,
                 branch, base_commit, operation_type, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                repo,
                collection_name,
                new_name,
                original_json,
                new_json,
                branch,
                base_commit,
                operation_type.as_str(),
                OpStatus::Pending.as_str(),
            ],
        )?;
        Ok(Some(self.conn.last_insert_rowid()))
    }

    /// List pending document operations for `(repo, branch)`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row is malformed.
    pub fn list_doc_ops(
        &self,
        repo: &str,
        branch: &str,
        status: Option<OpStatus>,
    ) -> Result<Vec<PendingDocOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repo, doc_id, collection, original_content_hash, original_metadata,
                    branch, base_commit, source, status, created_at, updated_at
             FROM pending_doc_ops
             WHERE repo = ?1 AND branch = ?2 AND (?3 IS NULL OR status = ?3)
             ORDER BY id ASC",
        )?;
        let status_filter = status.map(OpStatus::as_str);
        let rows = stmt
            .query_map(params![repo, branch, status_filter], Self::row_to_doc_op)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// List pending collection operations for `(repo, branch)`.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row is malformed.
    pub fn list_collection_ops(
        &self,
        repo: &str,
        branch: &str,
        status: Option<OpStatus>,
    ) -> Result<Vec<PendingCollectionOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repo, collection_name, new_name, original_metadata, new_metadata,
                    branch, base_commit, operation_type, status
             FROM pending_collection_ops
             WHERE repo = ?1 AND branch = ?2 AND (?3 IS NULL OR status = ?3)
             ORDER BY id ASC",
        )?;
        let status_filter = status.map(OpStatus::as_str);
        let rows = stmt
            .query_map(params![repo, branch, status_filter], Self::row_to_collection_op)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Transition a document operation to `status`.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or the write fails.
    pub fn set_doc_op_status(&self, id: i64, status: OpStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE pending_doc_ops SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(DmmsError::NotFound {
                kind: "pending_doc_op",
                name: id.to_string(),
            });
        }
        Ok(())
    }

    /// Transition a collection operation to `status`.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or the write fails.
    pub fn set_collection_op_status(&self, id: i64, status: OpStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE pending_collection_ops SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if updated == 0 {
            return Err(DmmsError::NotFound {
                kind: "pending_collection_op",
                name: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete all committed operations for `(repo, branch)`, returning the
    /// number of rows removed across both tables.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn cleanup_committed(&self, repo: &str, branch: &str) -> Result<u64> {
        let docs = self.conn.execute(
            "DELETE FROM pending_doc_ops WHERE repo = ?1 AND branch = ?2 AND status = ?3",
            params![repo, branch, OpStatus::Committed.as_str()],
        )?;
        let collections = self.conn.execute(
            "DELETE FROM pending_collection_ops WHERE repo = ?1 AND branch = ?2 AND status = ?3",
            params![repo, branch, OpStatus::Committed.as_str()],
        )?;
        Ok((docs + collections) as u64)
    }

    fn row_to_doc_op(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingDocOp> {
        let status_str: String = row.get(9)?;
        let metadata_str: String = row.get(5)?;
        let created_str: String = row.get(10)?;
        let updated_str: String = row.get(11)?;
        Ok(PendingDocOp {
            id: row.get(0)?,
            repo: row.get(1)?,
            doc_id: row.get(2)?,
            collection: row.get(3)?,
            original_content_hash: row.get(4)?,
            original_metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            branch: row.get(6)?,
            base_commit: row.get(7)?,
            source: row.get(8)?,
            status: OpStatus::from_str(&status_str).unwrap_or(OpStatus::Pending),
            created_at: created_str.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: updated_str.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_collection_op(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingCollectionOp> {
        let original_str: String = row.get(4)?;
        let new_str: String = row.get(5)?;
        let op_type_str: String = row.get(8)?;
        let status_str: String = row.get(9)?;
        Ok(PendingCollectionOp {
            id: row.get(0)?,
            repo: row.get(1)?,
            collection_name: row.get(2)?,
            new_name: row.get(3)?,
            original_metadata: serde_json::from_str(&original_str).unwrap_or_default(),
            new_metadata: serde_json::from_str(&new_str).unwrap_or_default(),
            branch: row.get(6)?,
            base_commit: row.get(7)?,
            operation_type: CollectionOpType::from_str(&op_type_str)
                .unwrap_or(CollectionOpType::MetadataUpdate),
            status: OpStatus::from_str(&status_str).unwrap_or(OpStatus::Pending),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn insert_and_list_doc_op() {
        let store = PendingOpStore::open_in_memory().unwrap();
        store
            .insert_doc_op(
                "/repo",
                "doc1",
                "alpha",
                "hash1",
                &Metadata::new(),
                "main",
                "abc123",
                "tool",
            )
            .unwrap();
        let ops = store.list_doc_ops("/repo", "main", None).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].doc_id, "doc1");
        assert_eq!(ops[0].status, OpStatus::Pending);
    }

    #[test]
    fn branch_isolation_in_doc_op_listing() {
        let store = PendingOpStore::open_in_memory().unwrap();
        store
            .insert_doc_op("/repo", "doc1", "alpha", "h", &Metadata::new(), "main", "c1", "tool")
            .unwrap();
        store
            .insert_doc_op(
                "/repo",
                "doc1",
                "alpha",
                "h",
                &Metadata::new(),
                "feature",
                "c1",
                "tool",
            )
            .unwrap();
        assert_eq!(store.list_doc_ops("/repo", "main", None).unwrap().len(), 1);
        assert_eq!(store.list_doc_ops("/repo", "feature", None).unwrap().len(), 1);
    }

    #[test]
    fn set_doc_op_status_transitions() {
        let store = PendingOpStore::open_in_memory().unwrap();
        let id = store
            .insert_doc_op("/repo", "doc1", "alpha", "h", &Metadata::new(), "main", "c1", "tool")
            .unwrap();
        store.set_doc_op_status(id, OpStatus::Committed).unwrap();
        let ops = store
            .list_doc_ops("/repo", "main", Some(OpStatus::Committed))
            .unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn set_doc_op_status_missing_row_errors() {
        let store = PendingOpStore::open_in_memory().unwrap();
        assert!(store.set_doc_op_status(999, OpStatus::Committed).is_err());
    }

    #[test]
    fn no_op_rename_with_unchanged_metadata_is_not_recorded() {
        let store = PendingOpStore::open_in_memory().unwrap();
        let m = meta(&[("k", json!("v"))]);
        let id = store
            .insert_collection_op(
                "/repo",
                "alpha",
                Some("alpha"),
                &m,
                &m,
                "main",
                "c1",
                CollectionOpType::Rename,
            )
            .unwrap();
        assert!(id.is_none());
        assert!(store.list_collection_ops("/repo", "main", None).unwrap().is_empty());
    }

    #[test]
    fn rename_with_metadata_change_is_recorded() {
        let store = PendingOpStore::open_in_memory().unwrap();
        let original = meta(&[("k", json!("v1"))]);
        let updated = meta(&[("k", json!("v2"))]);
        let id = store
            .insert_collection_op(
                "/repo",
                "alpha",
                Some("alpha"),
                &original,
                &updated,
                "main",
                "c1",
                CollectionOpType::Rename,
            )
            .unwrap();
        assert!(id.is_some());
        assert_eq!(store.list_collection_ops("/repo", "main", None).unwrap().len(), 1);
    }

    #[test]
    fn cleanup_committed_removes_only_committed_rows() {
        let store = PendingOpStore::open_in_memory().unwrap();
        let id1 = store
            .insert_doc_op("/repo", "doc1", "alpha", "h", &Metadata::new(), "main", "c1", "tool")
            .unwrap();
        store
            .insert_doc_op("/repo", "doc2", "alpha", "h", &Metadata::new(), "main", "c1", "tool")
            .unwrap();
        store.set_doc_op_status(id1, OpStatus::Committed).unwrap();
        let removed = store.cleanup_committed("/repo", "main").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_doc_ops("/repo", "main", None).unwrap().len(), 1);
    }

    #[test]
    fn reopening_an_existing_database_does_not_replay_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.db");
        {
            let store = PendingOpStore::open(&path).unwrap();
            store
                .insert_doc_op("/repo", "doc1", "alpha", "h", &Metadata::new(), "main", "c1", "tool")
                .unwrap();
        }
        let reopened = PendingOpStore::open(&path).unwrap();
        assert_eq!(reopened.list_doc_ops("/repo", "main", None).unwrap().len(), 1);
    }
}

//! Durable record of the last-known coherent sync position per
//! `(repo, collection, branch)` tuple (§4.3).
//!
//! Branch isolation is load-bearing here: two branches of the same
//! repository/collection must never be conflated, since a document can be
//! perfectly in sync on `main` while wildly diverged on a feature branch.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DmmsError, Result};
use crate::model::{SyncState, SyncStatus};
use crate::store::migrations::plan_migrations;

/// Durable store for per-branch sync state.
pub struct SyncStateStore {
    conn: Connection,
}

impl SyncStateStore {
    /// Open (creating if absent) the sync-state database at `path`.
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
        self.conn
            .execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)")?;
        let found: i64 = self
            .conn
            .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        for action in plan_migrations(found) {
            for statement in &action.statements {
                self.conn.execute_batch(statement)?;
            }
            self.conn.execute("DELETE FROM schema_meta", [])?;
            self.conn
                .execute("INSERT INTO schema_meta (version) VALUES (?1)", params![action.to_version])?;
        }
        Ok(())
    }

    /// Insert or replace the sync state for `(repo, collection, branch)`.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn upsert(&self, state: &SyncState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_state
                (repo, collection, branch, last_sync_commit, doc_count, chunk_count,
                 embedding_model, status, error_message, local_changes_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(repo, collection, branch) DO UPDATE SET
                last_sync_commit = excluded.last_sync_commit,
                doc_count = excluded.doc_count,
                chunk_count = excluded.chunk_count,
                embedding_model = excluded.embedding_model,
                status = excluded.status,
                error_message = excluded.error_message,
                local_changes_count = excluded.local_changes_count,
                updated_at = excluded.updated_at",
            params![
                state.repo,
                state.collection,
                state.branch,
                state.last_sync_commit,
                i64::try_from(state.doc_count).unwrap_or(i64::MAX),
                i64::try_from(state.chunk_count).unwrap_or(i64::MAX),
                state.embedding_model,
                state.status.as_str(),
                state.error_message,
                i64::try_from(state.local_changes_count).unwrap_or(i64::MAX),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch the sync state for `(repo, collection, branch)`, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row is malformed.
    pub fn get(&self, repo: &str, collection: &str, branch: &str) -> Result<Option<SyncState>> {
        self.conn
            .query_row(
                "SELECT repo, collection, branch, last_sync_commit, doc_count, chunk_count,
                        embedding_model, status, error_message, local_changes_count, updated_at
                 FROM sync_state WHERE repo = ?1 AND collection = ?2 AND branch = ?3",
                params![repo, collection, branch],
                Self::row_to_state,
            )
            .optional()
            .map_err(DmmsError::from)
    }

    /// List every sync-state row for `repo`, across all branches and collections.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_all(&self, repo: &str) -> Result<Vec<SyncState>> {
        let mut stmt = self.conn.prepare(
            "SELECT repo, collection, branch, last_sync_commit, doc_count, chunk_count,
                    embedding_model, status, error_message, local_changes_count, updated_at
             FROM sync_state WHERE repo = ?1 ORDER BY collection, branch",
        )?;
        let rows = stmt
            .query_map(params![repo], Self::row_to_state)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// List every sync-state row for `(repo, branch)`, across all collections.
    ///
    /// Branch isolation invariant: rows for other branches are never
    /// returned here, even if they share a collection name.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_branch(&self, repo: &str, branch: &str) -> Result<Vec<SyncState>> {
        let mut stmt = self.conn.prepare(
            "SELECT repo, collection, branch, last_sync_commit, doc_count, chunk_count,
                    embedding_model, status, error_message, local_changes_count, updated_at
             FROM sync_state WHERE repo = ?1 AND branch = ?2 ORDER BY collection",
        )?;
        let rows = stmt
            .query_map(params![repo, branch], Self::row_to_state)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every sync-state row for `(repo, branch)` — used when a branch
    /// is deleted so stale rows don't leak into a future branch with the same
    /// name.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn clear_branch(&self, repo: &str, branch: &str) -> Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_state WHERE repo = ?1 AND branch = ?2", params![repo, branch])?;
        Ok(removed as u64)
    }

    /// Update only the `last_sync_commit` field, leaving counts/status intact.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or the write fails.
    pub fn update_commit_hash(
        &self,
        repo: &str,
        collection: &str,
        branch: &str,
        commit_hash: &str,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE sync_state SET last_sync_commit = ?1, updated_at = ?2
             WHERE repo = ?3 AND collection = ?4 AND branch = ?5",
            params![commit_hash, Utc::now().to_rfc3339(), repo, collection, branch],
        )?;
        if updated == 0 {
            return Err(DmmsError::NotFound {
                kind: "sync_state",
                name: format!("{repo}/{collection}@{branch}"),
            });
        }
        Ok(())
    }

    /// Reconstruct a missing sync-state row as [`SyncStatus::Pending`] with
    /// zeroed counters, for a `(repo, collection, branch)` tuple that has
    /// never been synced before or whose row was lost (§4.3 cache
    /// invalidation / recovery path). Returns the existing row unchanged if
    /// one is already present.
    ///
    /// # Errors
    /// Returns an error if the read or write fails.
    pub fn reconstruct_if_missing(
        &self,
        repo: &str,
        collection: &str,
        branch: &str,
    ) -> Result<SyncState> {
        if let Some(existing) = self.get(repo, collection, branch)? {
            return Ok(existing);
        }
        let state = SyncState {
            repo: repo.to_owned(),
            collection: collection.to_owned(),
            branch: branch.to_owned(),
            last_sync_commit: None,
            doc_count: 0,
            chunk_count: 0,
            embedding_model: None,
            status: SyncStatus::Pending,
            error_message: None,
            local_changes_count: 0,
            updated_at: Utc::now(),
        };
        self.upsert(&state)?;
        Ok(state)
    }

    fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncState> {
        let status_str: String = row.get(7)?;
        let updated_str: String = row.get(10)?;
        let doc_count: i64 = row.get(4)?;
        let chunk_count: i64 = row.get(5)?;
        let local_changes: i64 = row.get(9)?;
        Ok(SyncState {
            repo: row.get(0)?,
            collection: row.get(1)?,
            branch: row.get(2)?,
            last_sync_commit: row.get(3)?,
            doc_count: doc_count.try_into().unwrap_or(0),
            chunk_count: chunk_count.try_into().unwrap_or(0),
            embedding_model: row.get(6)?,
            status: SyncStatus::from_str(&status_str).unwrap_or(SyncStatus::Error),
            error_message: row.get(8)?,
            local_changes_count: local_changes.try_into().unwrap_or(0),
            updated_at: updated_str.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(repo: &str, collection: &str, branch: &str) -> SyncState {
        SyncState {
            repo: repo.to_owned(),
            collection: collection.to_owned(),
            branch: branch.to_owned(),
            last_sync_commit: Some("abc123".to_owned()),
            doc_count: 10,
            chunk_count: 14,
            embedding_model: Some("text-embedding-3-small".to_owned()),
            status: SyncStatus::Synced,
            error_message: None,
            local_changes_count: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = SyncStateStore::open_in_memory().unwrap();
        let state = sample("/repo", "alpha", "main");
        store.upsert(&state).unwrap();
        let fetched = store.get("/repo", "alpha", "main").unwrap().unwrap();
        assert_eq!(fetched.doc_count, 10);
        assert_eq!(fetched.status, SyncStatus::Synced);
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let store = SyncStateStore::open_in_memory().unwrap();
        store.upsert(&sample("/repo", "alpha", "main")).unwrap();
        let mut updated = sample("/repo", "alpha", "main");
        updated.doc_count = 99;
        updated.status = SyncStatus::LocalChanges;
        store.upsert(&updated).unwrap();
        let fetched = store.get("/repo", "alpha", "main").unwrap().unwrap();
        assert_eq!(fetched.doc_count, 99);
        assert_eq!(fetched.status, SyncStatus::LocalChanges);
    }

    #[test]
    fn branch_isolation_invariant() {
        let store = SyncStateStore::open_in_memory().unwrap();
        store.upsert(&sample("/repo", "alpha", "main")).unwrap();
        store.upsert(&sample("/repo", "alpha", "feature")).unwrap();
        assert!(store.get("/repo", "alpha", "main").unwrap().is_some());
        assert!(store.get("/repo", "alpha", "feature").unwrap().is_some());
        assert_eq!(store.list_branch("/repo", "main").unwrap().len(), 1);
        assert_eq!(store.list_branch("/repo", "feature").unwrap().len(), 1);
    }

    #[test]
    fn clear_branch_only_removes_that_branch() {
        let store = SyncStateStore::open_in_memory().unwrap();
        store.upsert(&sample("/repo", "alpha", "main")).unwrap();
        store.upsert(&sample("/repo", "alpha", "feature")).unwrap();
        let removed = store.clear_branch("/repo", "feature").unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("/repo", "alpha", "main").unwrap().is_some());
        assert!(store.get("/repo", "alpha", "feature").unwrap().is_none());
    }

    #[test]
    fn update_commit_hash_preserves_other_fields() {
        let store = SyncStateStore::open_in_memory().unwrap();
        store.upsert(&sample("/repo", "alpha", "main")).unwrap();
        store
            .update_commit_hash("/repo", "alpha", "main", "def456")
            .unwrap();
        let fetched = store.get("/repo", "alpha", "main").unwrap().unwrap();
        assert_eq!(fetched.last_sync_commit, Some("def456".to_owned()));
        assert_eq!(fetched.doc_count, 10);
    }

    #[test]
    fn update_commit_hash_missing_row_errors() {
        let store = SyncStateStore::open_in_memory().unwrap();
        assert!(store
            .update_commit_hash("/repo", "ghost", "main", "x")
            .is_err());
    }

    #[test]
    fn reconstruct_if_missing_creates_pending_row_once() {
        let store = SyncStateStore::open_in_memory().unwrap();
        let state = store.reconstruct_if_missing("/repo", "alpha", "main").unwrap();
        assert_eq!(state.status, SyncStatus::Pending);
        assert_eq!(state.doc_count, 0);

        let again = store.reconstruct_if_missing("/repo", "alpha", "main").unwrap();
        assert_eq!(again.status, SyncStatus::Pending);
        assert_eq!(store.list_all("/repo").unwrap().len(), 1);
    }

    #[test]
    fn list_all_spans_branches_and_collections() {
        let store = SyncStateStore::open_in_memory().unwrap();
        store.upsert(&sample("/repo", "alpha", "main")).unwrap();
        store.upsert(&sample("/repo", "beta", "main")).unwrap();
        store.upsert(&sample("/repo", "alpha", "feature")).unwrap();
        assert_eq!(store.list_all("/repo").unwrap().len(), 3);
    }
}

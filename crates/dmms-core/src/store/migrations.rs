//! Forward-only schema migrations for the embedded SQLite stores (§4.10.1).
//!
//! Migrations are expressed as pure data (`MigrationAction`) so the plan can
//! be unit tested without a database, and applied by the stores themselves.

/// The schema version this build expects. Bump alongside adding a migration.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// One forward-only schema change, identified by the version it produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationAction {
    /// The schema version this action leaves the database at.
    pub to_version: i64,
    /// The DDL/DML statements to run, in order.
    pub statements: Vec<&'static str>,
}

/// Compute the sequence of migrations needed to go from `found_version` to
/// [`CURRENT_SCHEMA_VERSION`]. Returns an empty plan if already current.
///
/// Pure function: no I/O, so it can be tested directly and reused to report
/// "what would run" before actually touching the database.
#[must_use]
pub fn plan_migrations(found_version: i64) -> Vec<MigrationAction> {
    let mut plan = Vec::new();
    if found_version < 1 {
        plan.push(MigrationAction {
            to_version: 1,
            statements: vec![
                "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)",
                "CREATE TABLE IF NOT EXISTS pending_doc_ops (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repo TEXT NOT NULL,
                    doc_id TEXT NOT NULL,
                    collection TEXT NOT NULL,
                    original_content_hash TEXT NOT NULL,
                    original_metadata TEXT NOT NULL,
                    branch TEXT NOT NULL,
                    base_commit TEXT NOT NULL,
                    source TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_pending_doc_ops_lookup
                    ON pending_doc_ops (repo, branch, collection, doc_id)",
                "CREATE TABLE IF NOT EXISTS pending_collection_ops (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repo TEXT NOT NULL,
                    collection_name TEXT NOT NULL,
                    new_name TEXT,
                    original_metadata TEXT NOT NULL,
                    new_metadata TEXT NOT NULL,
                    branch TEXT NOT NULL,
                    base_commit TEXT NOT NULL,
                    operation_type TEXT NOT NULL,
                    status TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_pending_collection_ops_lookup
                    ON pending_collection_ops (repo, branch, collection_name)",
                "CREATE TABLE IF NOT EXISTS sync_state (
                    repo TEXT NOT NULL,
                    collection TEXT NOT NULL,
                    branch TEXT NOT NULL,
                    last_sync_commit TEXT,
                    doc_count INTEGER NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    embedding_model TEXT,
                    status TEXT NOT NULL,
                    error_message TEXT,
                    local_changes_count INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (repo, collection, branch)
                )",
            ],
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_plans_full_migration() {
        let plan = plan_migrations(0);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].to_version, 1);
    }

    #[test]
    fn current_database_plans_nothing() {
        assert!(plan_migrations(CURRENT_SCHEMA_VERSION).is_empty());
    }
}

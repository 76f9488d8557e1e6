//! `dolt` subprocess plumbing and the [`DoltGateway`] implementation.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;

use dmms_core::error::{DmmsError, Result};
use dmms_core::gateway::DoltGateway;
use dmms_core::model::{Document, Metadata};
use dmms_core::sqljson::{escape_json_for_sql, escape_sql_string, parse_json_column};
use tracing::instrument;

/// Configuration for one repository's Dolt gateway.
#[derive(Clone, Debug)]
pub struct DoltConfig {
    /// Working directory containing the Dolt database (where `dolt` is run).
    pub repo_path: PathBuf,
    /// Name of the `dolt` binary, for test doubles or unusual `$PATH` setups.
    pub dolt_binary: String,
    /// Per-command timeout. Enforced by the caller's process-management
    /// layer in the server binary; this crate records it for
    /// [`DmmsError::ExternalCommandTimeout`] reporting but does not itself
    /// spawn a watchdog thread.
    pub timeout: Duration,
}

impl DoltConfig {
    /// Build a config pointing at `repo_path` with the default `dolt` binary
    /// name and a 30 second timeout.
    #[must_use]
    pub fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            dolt_binary: "dolt".to_owned(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`DoltGateway`] implementation backed by the `dolt` CLI.
pub struct DoltCliGateway {
    config: DoltConfig,
}

impl DoltCliGateway {
    /// Wrap `config` as a gateway.
    #[must_use]
    pub const fn new(config: DoltConfig) -> Self {
        Self { config }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.config.dolt_binary)
            .args(args)
            .current_dir(&self.config.repo_path)
            .output()
            .map_err(DmmsError::from)
    }

    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(DmmsError::ExternalCommandFailed {
                command: format!("dolt {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a SQL query through `dolt sql -q "..." -r json` and parse the
    /// `rows` array of the resulting JSON document.
    fn query(&self, sql: &str) -> Result<Vec<serde_json::Value>> {
        let stdout = self.run_checked(&["sql", "-q", sql, "-r", "json"])?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: serde_json::Value = serde_json::from_str(&stdout)?;
        Ok(parsed
            .get("rows")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.run_checked(&["sql", "-q", sql])?;
        Ok(())
    }

    fn row_to_document(row: &serde_json::Value) -> Result<Document> {
        let doc_id = row
            .get("doc_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| DmmsError::Internal {
                detail: "dolt row missing doc_id column".to_owned(),
            })?
            .to_owned();
        let content = row
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let metadata_raw = row.get("metadata").and_then(serde_json::Value::as_str).unwrap_or("");
        let metadata_value = parse_json_column(metadata_raw)?;
        let metadata: Metadata = serde_json::from_value(metadata_value).unwrap_or_default();
        Ok(Document::new(doc_id, content, metadata))
    }
}

impl DoltGateway for DoltCliGateway {
    #[instrument(skip(self), fields(branch))]
    fn current_commit(&self, branch: &str) -> Result<String> {
        let sql = format!("SELECT HASHOF('{}') AS commit_hash", escape_sql_string(branch));
        let rows = self.query(&sql)?;
        rows.first()
            .and_then(|r| r.get("commit_hash"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| DmmsError::NotFound {
                kind: "branch",
                name: branch.to_owned(),
            })
    }

    #[instrument(skip(self), fields(branch))]
    fn checkout(&self, branch: &str) -> Result<()> {
        let checkout = self.run(&["checkout", branch])?;
        if checkout.status.success() {
            return Ok(());
        }
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    #[instrument(skip(self), fields(collection, branch))]
    fn read_documents(&self, collection: &str, branch: &str) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT doc_id, content, metadata FROM `{collection}` AS OF '{}'",
            escape_sql_string(branch)
        );
        self.query(&sql)?.iter().map(Self::row_to_document).collect()
    }

    #[instrument(skip(self, doc), fields(collection, branch, doc_id = %doc.doc_id))]
    fn write_document(&self, collection: &str, _branch: &str, doc: &Document) -> Result<()> {
        let metadata_value = serde_json::to_value(&doc.metadata)?;
        let metadata_sql = escape_json_for_sql(&metadata_value)?;
        let sql = format!(
            "INSERT INTO `{collection}` (doc_id, content, metadata, content_hash)
             VALUES ('{}', '{}', '{metadata_sql}', '{}')
             ON DUPLICATE KEY UPDATE content = VALUES(content), metadata = VALUES(metadata),
                content_hash = VALUES(content_hash)",
            escape_sql_string(&doc.doc_id),
            escape_sql_string(&doc.content),
            escape_sql_string(&doc.content_hash),
        );
        self.execute(&sql)
    }

    #[instrument(skip(self), fields(collection, branch, doc_id))]
    fn delete_document(&self, collection: &str, _branch: &str, doc_id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM `{collection}` WHERE doc_id = '{}'",
            escape_sql_string(doc_id)
        );
        self.execute(&sql)
    }

    #[instrument(skip(self), fields(branch, message))]
    fn commit(&self, branch: &str, message: &str) -> Result<String> {
        self.run_checked(&["add", "-A"])?;
        let commit = self.run(&["commit", "-m", message])?;
        if !commit.status.success() {
            let stderr = String::from_utf8_lossy(&commit.stderr);
            if stderr.contains("nothing to commit") {
                return self.current_commit(branch);
            }
            return Err(DmmsError::ExternalCommandFailed {
                command: format!("dolt commit -m {message}"),
                stderr: stderr.trim().to_owned(),
                exit_code: commit.status.code(),
            });
        }
        self.current_commit(branch)
    }

    #[instrument(skip(self), fields(branch_a, branch_b))]
    fn merge_base(&self, branch_a: &str, branch_b: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT commit_hash FROM dolt_merge_base('{}', '{}')",
            escape_sql_string(branch_a),
            escape_sql_string(branch_b)
        );
        let rows = self.query(&sql)?;
        Ok(rows
            .first()
            .and_then(|r| r.get("commit_hash"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned))
    }

    #[instrument(skip(self), fields(collection, new_name, branch))]
    fn rename_collection(&self, collection: &str, new_name: &str, _branch: &str) -> Result<()> {
        let sql = format!("RENAME TABLE `{collection}` TO `{new_name}`");
        self.execute(&sql)
    }

    #[instrument(skip(self), fields(collection, branch))]
    fn drop_collection(&self, collection: &str, _branch: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS `{collection}`");
        self.execute(&sql)
    }
}

impl DoltCliGateway {
    /// Raw `dolt log` output for `branch`, most recent first, newline-separated.
    ///
    /// This is a passthrough for the MCP log tool (§6) rather than something
    /// `SyncManager` depends on, so it lives here rather than on
    /// [`DoltGateway`].
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn log(&self, branch: &str, max_count: u32) -> Result<String> {
        self.run_checked(&["log", branch, "-n", &max_count.to_string()])
    }

    /// Raw `dolt diff` output between two commit-ish references.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn diff(&self, from: &str, to: &str) -> Result<String> {
        self.run_checked(&["diff", from, to])
    }

    /// Raw `dolt status` output for the current checkout.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn status(&self) -> Result<String> {
        self.run_checked(&["status"])
    }

    /// Create `branch` from the current HEAD without checking it out.
    ///
    /// # Errors
    /// Returns an error if a branch with that name already exists or the
    /// command otherwise fails.
    pub fn create_branch(&self, branch: &str) -> Result<()> {
        self.run_checked(&["branch", branch])?;
        Ok(())
    }

    /// List local branch names.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let rows = self.query("SELECT name FROM dolt_branches")?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("name").and_then(serde_json::Value::as_str))
            .map(str::to_owned)
            .collect())
    }

    /// Push `branch` to `remote`.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", remote, branch])?;
        Ok(())
    }

    /// Pull `branch` from `remote`.
    ///
    /// # Errors
    /// Returns an error if the command fails.
    pub fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["pull", remote, branch])?;
        Ok(())
    }
}

//! Unified error type for the sync core.
//!
//! Defines [`DmmsError`], the error type shared by every sync-core component.
//! Error messages are designed to be agent-friendly: each variant includes a
//! clear description of what went wrong and actionable guidance on how to
//! fix it. No transport-layer concepts (tool names, JSON-RPC) leak into this
//! module — all errors are expressed in terms of the sync core's own
//! abstractions (collections, documents, branches, commits).

use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// DmmsError
// ---------------------------------------------------------------------------

/// Unified error type for sync-core operations.
#[derive(Debug)]
pub enum DmmsError {
    /// A named entity (collection, document, branch) does not exist.
    NotFound {
        /// What kind of entity was missing (e.g. `"collection"`, `"document"`).
        kind: &'static str,
        /// The name or ID that was not found.
        name: String,
    },

    /// A create call targeted a name that already exists.
    AlreadyExists {
        /// What kind of entity already exists.
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// Malformed input: empty name, unknown resolution, invalid filter, etc.
    Validation {
        /// Human-readable description of what was wrong.
        detail: String,
    },

    /// The VCS reports conflicts that require user resolution, or an
    /// operation would lose local changes.
    Conflict {
        /// Human-readable description of the conflict.
        detail: String,
    },

    /// An external command (VCS or vector store) failed outright.
    ExternalCommandFailed {
        /// The command that was run (e.g. `"dolt commit -m ..."`).
        command: String,
        /// Captured stderr.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },

    /// An external command exceeded its configured timeout.
    ExternalCommandTimeout {
        /// The command that was run.
        command: String,
        /// The timeout that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// On-disk state uses an older schema that must be migrated before use.
    SchemaMigrationRequired {
        /// The schema version found on disk.
        found_version: i64,
        /// The schema version this build expects.
        expected_version: i64,
    },

    /// An internal invariant was violated.
    Internal {
        /// Human-readable description of the violated invariant.
        detail: String,
    },

    /// Configuration could not be loaded or parsed.
    Config {
        /// Path to the configuration source, if file-backed.
        path: Option<PathBuf>,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// An I/O error occurred during a sync-core operation.
    Io(std::io::Error),
}

impl fmt::Display for DmmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, name } => {
                write!(
                    f,
                    "{kind} '{name}' not found.\n  To fix: check the name and retry, or list available {kind}s first."
                )
            }
            Self::AlreadyExists { kind, name } => {
                write!(
                    f,
                    "{kind} '{name}' already exists.\n  To fix: use a different name, or remove the existing {kind} first."
                )
            }
            Self::Validation { detail } => {
                write!(f, "invalid input: {detail}")
            }
            Self::Conflict { detail } => {
                write!(
                    f,
                    "conflict: {detail}\n  To fix: resolve the conflict(s) and retry."
                )
            }
            Self::ExternalCommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "external command failed: {command}")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, "\n  stderr: {stderr}")?;
                }
                write!(f, "\n  To fix: check the external store/VCS state and retry.")
            }
            Self::ExternalCommandTimeout {
                command,
                timeout_secs,
            } => {
                write!(
                    f,
                    "external command timed out after {timeout_secs}s: {command}\n  To fix: increase the configured timeout or check the external process for hangs."
                )
            }
            Self::SchemaMigrationRequired {
                found_version,
                expected_version,
            } => {
                write!(
                    f,
                    "on-disk schema is version {found_version}, this build expects {expected_version}.\n  To fix: run the pending-op store's migration step before retrying."
                )
            }
            Self::Internal { detail } => {
                write!(f, "internal invariant violated: {detail}")
            }
            Self::Config { path, detail } => {
                if let Some(path) = path {
                    write!(f, "configuration error in '{}': {detail}", path.display())
                } else {
                    write!(f, "configuration error: {detail}")
                }
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

impl std::error::Error for DmmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DmmsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<rusqlite::Error> for DmmsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::ExternalCommandFailed {
            command: "sqlite".to_owned(),
            stderr: err.to_string(),
            exit_code: None,
        }
    }
}

impl From<serde_json::Error> for DmmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation {
            detail: format!("invalid JSON: {err}"),
        }
    }
}

/// Convenience alias used throughout the sync core.
pub type Result<T> = std::result::Result<T, DmmsError>;

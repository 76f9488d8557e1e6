//! Server configuration, loaded once from the environment at process start.
//!
//! Mirrors the split the sync core uses for on-disk config: a pure parsing
//! function (here, [`DmmsConfig::from_lookup`]) that tests can exercise
//! without touching the real process environment, and a thin [`DmmsConfig::from_env`]
//! wrapper that calls it against `std::env::var`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use dmms_core::error::DmmsError;

/// Which [`dmms_chroma`] gateway implementation to construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromaMode {
    /// Embedded SQLite-backed store ([`dmms_chroma::PersistentChromaGateway`]).
    Persistent,
    /// HTTP client against a running Chroma server ([`dmms_chroma::HttpChromaGateway`]).
    Server,
}

impl fmt::Display for ChromaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Top-level server configuration, read once at startup and passed by
/// reference into every gateway and the `SyncManager`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmmsConfig {
    /// `CHROMA_MODE`.
    pub chroma_mode: ChromaMode,
    /// `CHROMA_DATA_PATH`, used when `chroma_mode == Persistent`.
    pub chroma_data_path: PathBuf,
    /// `CHROMA_HOST`, used when `chroma_mode == Server`.
    pub chroma_host: String,
    /// `CHROMA_PORT`, used when `chroma_mode == Server`.
    pub chroma_port: u16,
    /// `DOLT_REPOSITORY_PATH`.
    pub dolt_repository_path: PathBuf,
    /// `DOLT_EXECUTABLE_PATH`.
    pub dolt_executable_path: String,
    /// `DOLT_REMOTE_NAME`.
    pub dolt_remote_name: String,
    /// `DOLT_REMOTE_URL`, if a remote is configured.
    pub dolt_remote_url: Option<String>,
    /// `DOLT_COMMAND_TIMEOUT`, in seconds.
    pub dolt_command_timeout: Duration,
    /// `CONNECTION_TIMEOUT`, in seconds.
    pub connection_timeout: Duration,
    /// `BUFFER_SIZE`.
    pub buffer_size: usize,
    /// `MAX_RETRIES`.
    pub max_retries: u32,
    /// `RETRY_DELAY`, in milliseconds.
    pub retry_delay: Duration,
    /// `ENABLE_LOGGING`.
    pub enable_logging: bool,
    /// `LOG_LEVEL`.
    pub log_level: String,
    /// `LOG_FILE_NAME`, if logging to a file.
    pub log_file_name: Option<String>,
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl DmmsConfig {
    /// Load configuration from the real process environment.
    ///
    /// # Errors
    /// Returns [`DmmsError::Config`] if an enum-like field holds an
    /// unrecognized value or a numeric field fails to parse.
    pub fn from_env() -> Result<Self, DmmsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup function.
    ///
    /// # Errors
    /// Returns [`DmmsError::Config`] if an enum-like field holds an
    /// unrecognized value or a numeric field fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DmmsError> {
        let chroma_mode = match lookup("CHROMA_MODE").as_deref() {
            None | Some("persistent") => ChromaMode::Persistent,
            Some("server") => ChromaMode::Server,
            Some(other) => {
                return Err(config_error(format!(
                    "CHROMA_MODE must be 'persistent' or 'server', got '{other}'"
                )));
            }
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_owned());
        if !VALID_LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(config_error(format!(
                "LOG_LEVEL must be one of {VALID_LOG_LEVELS:?}, got '{log_level}'"
            )));
        }

        Ok(Self {
            chroma_mode,
            chroma_data_path: lookup("CHROMA_DATA_PATH")
                .map_or_else(|| PathBuf::from(".dmms/chroma.db"), PathBuf::from),
            chroma_host: lookup("CHROMA_HOST").unwrap_or_else(|| "localhost".to_owned()),
            chroma_port: parse_or(&lookup, "CHROMA_PORT", 8000)?,
            dolt_repository_path: lookup("DOLT_REPOSITORY_PATH")
                .map_or_else(|| PathBuf::from("."), PathBuf::from),
            dolt_executable_path: lookup("DOLT_EXECUTABLE_PATH").unwrap_or_else(|| "dolt".to_owned()),
            dolt_remote_name: lookup("DOLT_REMOTE_NAME").unwrap_or_else(|| "origin".to_owned()),
            dolt_remote_url: lookup("DOLT_REMOTE_URL"),
            dolt_command_timeout: Duration::from_secs(parse_or(&lookup, "DOLT_COMMAND_TIMEOUT", 30)?),
            connection_timeout: Duration::from_secs(parse_or(&lookup, "CONNECTION_TIMEOUT", 30)?),
            buffer_size: parse_or(&lookup, "BUFFER_SIZE", 8192)?,
            max_retries: parse_or(&lookup, "MAX_RETRIES", 3)?,
            retry_delay: Duration::from_millis(parse_or(&lookup, "RETRY_DELAY", 500)?),
            enable_logging: lookup("ENABLE_LOGGING").is_some_and(|v| v == "true" || v == "1"),
            log_level,
            log_file_name: lookup("LOG_FILE_NAME"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, DmmsError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| config_error(format!("{key} must be a number, got '{raw}'"))),
    }
}

fn config_error(detail: String) -> DmmsError {
    DmmsError::Config { path: None, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + '_ {
        move |key| vars.get(key).map(|v| (*v).to_owned())
    }

    #[test]
    fn defaults_with_empty_environment() {
        let vars = HashMap::new();
        let cfg = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(cfg.chroma_mode, ChromaMode::Persistent);
        assert_eq!(cfg.chroma_port, 8000);
        assert_eq!(cfg.dolt_executable_path, "dolt");
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.enable_logging);
    }

    #[test]
    fn parses_server_mode_and_numeric_overrides() {
        let vars = HashMap::from([
            ("CHROMA_MODE", "server"),
            ("CHROMA_HOST", "chroma.internal"),
            ("CHROMA_PORT", "9000"),
            ("MAX_RETRIES", "5"),
            ("ENABLE_LOGGING", "true"),
        ]);
        let cfg = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(cfg.chroma_mode, ChromaMode::Server);
        assert_eq!(cfg.chroma_host, "chroma.internal");
        assert_eq!(cfg.chroma_port, 9000);
        assert_eq!(cfg.max_retries, 5);
        assert!(cfg.enable_logging);
    }

    #[test]
    fn rejects_unknown_chroma_mode() {
        let vars = HashMap::from([("CHROMA_MODE", "turbo")]);
        let err = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, DmmsError::Config { .. }));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let vars = HashMap::from([("LOG_LEVEL", "shout")]);
        let err = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, DmmsError::Config { .. }));
    }

    #[test]
    fn rejects_non_numeric_port() {
        let vars = HashMap::from([("CHROMA_PORT", "not-a-port")]);
        let err = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, DmmsError::Config { .. }));
    }

    #[test]
    fn enable_logging_accepts_numeric_flag() {
        let vars = HashMap::from([("ENABLE_LOGGING", "1")]);
        let cfg = DmmsConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert!(cfg.enable_logging);
    }
}

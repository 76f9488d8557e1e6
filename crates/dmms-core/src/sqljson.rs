//! Safe embedding of JSON into SQL literals, and tolerant JSON column reads.
//!
//! The VCS gateway talks to Dolt over its CLI (`dolt sql -q "..."`), which
//! gives us a single SQL statement as a string rather than a prepared
//! statement with bound parameters. Every `metadata JSON` column value must
//! therefore be escaped into a SQL string literal by hand. This module is the
//! single place that does that, so every call site gets the same two-stage
//! escape: first canonicalize to JSON text, then escape for SQL.

use serde_json::Value;

use crate::error::{DmmsError, Result};

/// Serialize `value` to compact JSON and escape it for embedding inside a
/// single-quoted SQL string literal.
///
/// The returned string does **not** include the surrounding quotes — callers
/// write `format!("'{}'", escape_json_for_sql(v)?)`.
///
/// # Errors
/// Returns an error if `value` cannot be serialized to JSON.
pub fn escape_json_for_sql(value: &Value) -> Result<String> {
    let json_text = serde_json::to_string(value)?;
    Ok(escape_sql_string(&json_text))
}

/// Escape a literal string for embedding inside a single-quoted SQL string.
///
/// Doubles single quotes (the SQL-standard escape) and backslashes (Dolt's
/// underlying MySQL-compatible parser treats backslash as an escape
/// character inside string literals, so a literal backslash — as appears in
/// Windows paths — must itself be escaped or it will eat the following
/// character).
#[must_use]
pub fn escape_sql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parse a JSON column value read back from the VCS into a [`Value`].
///
/// Tolerant of the column coming back as a JSON-encoded string (i.e.
/// double-encoded: the column itself is a JSON string literal whose content
/// is JSON) as well as a plain JSON value, since different Dolt client paths
/// surface `JSON` columns differently.
///
/// # Errors
/// Returns an error if `raw` is not valid JSON under either interpretation.
pub fn parse_json_column(raw: &str) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) => serde_json::from_str(&inner).map_err(DmmsError::from),
        Ok(other) => Ok(other),
        Err(outer) => Err(DmmsError::from(outer)),
    }
}

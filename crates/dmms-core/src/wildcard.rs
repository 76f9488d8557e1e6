//! `*`-glob matching used by import filters and collection tracking rules (§4.9).
//!
//! A pattern is a literal string optionally containing `*` (zero or more
//! characters of any value, including `/` and `_`). Matching is case-sensitive
//! and anchored at both ends. Empty values never match any pattern.

/// Classification of a pattern's shape, used for diagnostics and UI hints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternType {
    /// No wildcard; matches by literal equality.
    Exact,
    /// `literal*` — matches by prefix.
    Prefix,
    /// `*literal` — matches by suffix.
    Suffix,
    /// `*literal*` — matches by substring containment.
    Contains,
    /// Any other arrangement of `*` (e.g. `a*b*c`).
    Complex,
    /// The empty pattern.
    Empty,
}

/// Returns `true` if `pattern` contains at least one `*`.
#[must_use]
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Classify the shape of `pattern` (§4.9 convenience).
#[must_use]
pub fn get_pattern_type(pattern: &str) -> PatternType {
    if pattern.is_empty() {
        return PatternType::Empty;
    }
    if !has_wildcard(pattern) {
        return PatternType::Exact;
    }
    let star_count = pattern.matches('*').count();
    let starts = pattern.starts_with('*');
    let ends = pattern.ends_with('*');
    if star_count == 1 && ends && !starts {
        PatternType::Prefix
    } else if star_count == 1 && starts && !ends {
        PatternType::Suffix
    } else if star_count == 2 && starts && ends {
        PatternType::Contains
    } else {
        PatternType::Complex
    }
}

/// Returns `true` if `value` matches `pattern`.
///
/// An empty `value` never matches, even against the bare `*` pattern. A
/// pattern with no `*` matches only by literal equality. Otherwise the
/// pattern is split on `*` into literal segments, and `value` must start
/// with the first segment, end with the last, and contain the remaining
/// segments in order (the classic glob-to-regex construction, done by hand
/// so no additional dependency is needed for this single narrow use).
#[must_use]
pub fn matches(pattern: &str, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if !has_wildcard(pattern) {
        return pattern == value;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments.first().copied().unwrap_or("");
    let last = segments.last().copied().unwrap_or("");

    if !value.starts_with(first) {
        return false;
    }
    if !value.ends_with(last) {
        return false;
    }

    let mut cursor = first.len();
    let end_bound = value.len() - last.len();
    if cursor > end_bound {
        return false;
    }

    for segment in &segments[1..segments.len().saturating_sub(1)] {
        if segment.is_empty() {
            continue;
        }
        match value[cursor..end_bound].find(segment) {
            Some(pos) => cursor += pos + segment.len(),
            None => return false,
        }
    }
    true
}

/// Filter `values` to those matching `pattern`.
#[must_use]
pub fn filter_by_pattern<'a>(pattern: &str, values: &[&'a str]) -> Vec<&'a str> {
    values
        .iter()
        .copied()
        .filter(|v| matches(pattern, v))
        .collect()
}

/// Filter `values` to those matching any of `patterns` (union, de-duplicated,
/// order preserved by first occurrence).
#[must_use]
pub fn filter_by_patterns<'a>(patterns: &[&str], values: &[&'a str]) -> Vec<&'a str> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if patterns.iter().any(|p| matches(p, value)) && seen.insert(*value) {
            out.push(*value);
        }
    }
    out
}

/// Returns `true` if any of `values` matches `pattern`.
#[must_use]
pub fn any_match(pattern: &str, values: &[&str]) -> bool {
    values.iter().any(|v| matches(pattern, v))
}

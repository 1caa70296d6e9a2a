//! SQL statement classification
//!
//! Statements are executed verbatim; only the leading keyword is inspected to
//! decide how the result is rendered and whether the session database changed.

use std::fmt;

/// Coarse kind of a SQL statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Returns rows: SELECT, SHOW, DESC
    Query,
    Update,
    Insert,
    Delete,
    /// Switches the session database
    Use,
    Other,
}

impl StatementKind {
    /// Whether the statement produces a row set
    pub fn returns_rows(&self) -> bool {
        matches!(self, StatementKind::Query)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Query => "query",
            StatementKind::Update => "update",
            StatementKind::Insert => "insert",
            StatementKind::Delete => "delete",
            StatementKind::Use => "use",
            StatementKind::Other => "other",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a statement by its first word (case-insensitive)
pub fn classify(sql: &str) -> StatementKind {
    let first = sql
        .trim()
        .split(|c: char| c.is_whitespace() || c == ';' || c == '(')
        .next()
        .unwrap_or("");

    match first.to_ascii_lowercase().as_str() {
        "select" | "show" | "desc" => StatementKind::Query,
        "update" => StatementKind::Update,
        "insert" => StatementKind::Insert,
        "delete" => StatementKind::Delete,
        "use" => StatementKind::Use,
        _ => StatementKind::Other,
    }
}

/// Database name targeted by a `USE` statement, without quoting
pub fn use_target(sql: &str) -> Option<String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let (keyword, rest) = trimmed.split_once(char::is_whitespace)?;
    if !keyword.eq_ignore_ascii_case("use") {
        return None;
    }
    let name = rest.trim().trim_matches('`');
    (!name.is_empty()).then(|| name.to_string())
}

/// Report the session database after a statement ran
///
/// Only `USE` changes the database. `selected` is what the server reports as
/// the current database once the statement completed; the statement text is
/// the fallback when the server reported nothing.
pub fn changed_database(kind: StatementKind, sql: &str, selected: Option<String>) -> Option<String> {
    if kind != StatementKind::Use {
        return None;
    }
    selected.or_else(|| use_target(sql))
}

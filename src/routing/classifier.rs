//! Query classification.
//!
//! # Responsibilities
//! - Decide whether a statement needs the primary (Write) or may be served
//!   by a replica (Read)
//!
//! # Design Decisions
//! - Pure and case-insensitive; every string classifies, there is no error
//! - Keywords match whole words only (`updates` is not `UPDATE`)
//! - Row-locking reads (`FOR UPDATE`, `FOR SHARE`, and the `NO KEY` / `KEY`
//!   variants) are Writes wherever they appear
//! - A `WITH` statement containing INSERT/UPDATE/DELETE is a data-modifying
//!   CTE and therefore a Write

use serde::Serialize;

/// Routing class of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Read,
    Write,
}

impl QueryKind {
    pub fn is_write(self) -> bool {
        self == QueryKind::Write
    }

    /// Metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Read => "read",
            QueryKind::Write => "write",
        }
    }
}

/// Leading keywords that always need the primary.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE", "GRANT", "REVOKE",
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "LOCK",
];

/// Statements that may follow `WITH` and modify data.
const CTE_WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// Classify a SQL statement.
pub fn classify(sql: &str) -> QueryKind {
    let upper = sql.to_ascii_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    let Some(&first) = words.first() else {
        return QueryKind::Read;
    };

    // The first word must also be the first thing in the statement, so that
    // `(INSERT ...` or a leading comment does not count as a prefix match.
    let leading = upper.trim_start().starts_with(first);

    if leading && WRITE_KEYWORDS.contains(&first) {
        return QueryKind::Write;
    }

    if has_locking_clause(&words) {
        return QueryKind::Write;
    }

    if leading && first == "WITH" && words.iter().any(|w| CTE_WRITE_KEYWORDS.contains(w)) {
        return QueryKind::Write;
    }

    QueryKind::Read
}

/// `FOR UPDATE`, `FOR SHARE`, `FOR NO KEY UPDATE`, `FOR KEY SHARE`.
fn has_locking_clause(words: &[&str]) -> bool {
    words.windows(2).enumerate().any(|(i, pair)| {
        if pair[0] != "FOR" {
            return false;
        }
        match pair[1] {
            "UPDATE" | "SHARE" => true,
            "NO" => words.get(i + 2..i + 4) == Some(&["KEY", "UPDATE"][..]),
            "KEY" => words.get(i + 2) == Some(&"SHARE"),
            _ => false,
        }
    })
}

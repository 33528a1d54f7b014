//! Lightweight SQL statement classification.
//!
//! The pipeline needs just enough classification to drive change
//! notification and the read-only/DDL firewalls: is this statement a query,
//! a modification, or DDL? Classification keys off the first significant
//! keyword; the statement itself goes to the driver verbatim.

/// Coarse statement categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces a result set.
    Query,
    /// INSERT / UPDATE / DELETE family; triggers change notification.
    Modifying,
    /// Schema changes.
    Ddl,
    /// Anything else (transaction control, vendor statements).
    Other,
}

/// Classify by first significant keyword, skipping comments.
pub fn classify(sql: &str) -> StatementKind {
    let Some(keyword) = first_keyword(sql) else {
        return StatementKind::Other;
    };
    match keyword.as_str() {
        "SELECT" | "VALUES" | "WITH" | "SHOW" | "PRAGMA" | "EXPLAIN" | "DESCRIBE" => {
            StatementKind::Query
        }
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "MERGE" | "UPSERT" => {
            StatementKind::Modifying
        }
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "GRANT" | "REVOKE" | "RENAME" => {
            StatementKind::Ddl
        }
        _ => StatementKind::Other,
    }
}

/// First keyword after whitespace, `--` line comments, and `/* */` block
/// comments, uppercased.
fn first_keyword(sql: &str) -> Option<String> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

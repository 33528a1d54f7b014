//! Result-set column metadata.

use serde::Serialize;

/// Metadata for one result-set column, computed once per result set and
/// reused for every row.
#[derive(Debug, Clone, Serialize)]
pub struct ResultColumn {
    /// Driver type code (ODBC/JDBC numbering where the driver provides it).
    pub type_code: i32,
    /// Driver type name, e.g. `VARCHAR`, `oid`.
    pub type_name: String,
    /// Column label.
    pub name: String,
    /// Owning table, when the driver reports one.
    pub table: Option<String>,
    /// True when cells in this column spool to files instead of inlining.
    pub is_large_object: bool,
}

impl ResultColumn {
    /// Build column metadata, classifying large-object columns.
    ///
    /// Besides the obvious binary/LOB type codes, one vendor quirk is folded
    /// in here: PostgreSQL large objects surface as numeric `oid` columns, so
    /// an integer column whose type name is `oid` (or whose name matches the
    /// conventional large-object column naming) is treated as a BLOB.
    pub fn new(type_code: i32, type_name: impl Into<String>, name: impl Into<String>, table: Option<String>) -> Self {
        let type_name = type_name.into();
        let name = name.into();
        let is_large_object =
            is_lob_type_code(type_code) || is_oid_large_object(&type_name, &name);
        ResultColumn {
            type_code,
            type_name,
            name,
            table,
            is_large_object,
        }
    }
}

fn is_lob_type_code(code: i32) -> bool {
    // BINARY, VARBINARY, LONGVARBINARY, BLOB, CLOB
    matches!(code, -2 | -3 | -4 | 2004 | 2005)
}

/// PostgreSQL `oid` heuristic: the column type is the numeric object
/// identifier and the schema uses it as a large-object pointer.
pub fn is_oid_large_object(type_name: &str, column_name: &str) -> bool {
    if !type_name.eq_ignore_ascii_case("oid") {
        return false;
    }
    // System oid columns (`oid`, `tableoid`, ...) are plain numbers; user
    // columns holding lo pointers conventionally carry a lob-ish name.
    let lower = column_name.to_ascii_lowercase();
    lower.contains("lob") || lower.contains("blob") || lower.contains("image") || lower.contains("doc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lob_classification_by_type_code() {
        let col = ResultColumn::new(2004, "BLOB", "payload", None);
        assert!(col.is_large_object);
        let col = ResultColumn::new(12, "VARCHAR", "name", Some("users".into()));
        assert!(!col.is_large_object);
    }

    #[test]
    fn test_oid_heuristic() {
        assert!(is_oid_large_object("oid", "photo_blob"));
        assert!(is_oid_large_object("OID", "scan_image"));
        assert!(!is_oid_large_object("oid", "tableoid"));
        assert!(!is_oid_large_object("integer", "blob_id"));
    }
}

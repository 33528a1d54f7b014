//! The closed wire type enumeration.
//!
//! Every SQL value crossing the HTTP boundary is tagged with one of these
//! keywords. The set is fixed: an unknown keyword is a parameter error, never
//! a fallback. `TYPE_NULL` is parametrized with the native type code of the
//! column the null targets, e.g. `TYPE_NULL12`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire type keywords for SQL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Char,
    Varchar,
    Longvarchar,
    Numeric,
    Decimal,
    Bit,
    Tinyint,
    Smallint,
    Integer,
    Bigint,
    Real,
    Float,
    DoublePrecision,
    Date,
    Time,
    Timestamp,
    Binary,
    Varbinary,
    Longvarbinary,
    Blob,
    Clob,
    Url,
    /// Typed SQL NULL carrying the native type code of the target column.
    TypeNull(i32),
}

impl WireType {
    /// Conventional driver type code for this wire type.
    ///
    /// Codes follow the ODBC/JDBC numbering so that result-set metadata from
    /// mainstream drivers maps onto the same space.
    pub fn type_code(&self) -> i32 {
        match self {
            WireType::Char => 1,
            WireType::Varchar => 12,
            WireType::Longvarchar => -1,
            WireType::Numeric => 2,
            WireType::Decimal => 3,
            WireType::Bit => -7,
            WireType::Tinyint => -6,
            WireType::Smallint => 5,
            WireType::Integer => 4,
            WireType::Bigint => -5,
            WireType::Real => 7,
            WireType::Float => 6,
            WireType::DoublePrecision => 8,
            WireType::Date => 91,
            WireType::Time => 92,
            WireType::Timestamp => 93,
            WireType::Binary => -2,
            WireType::Varbinary => -3,
            WireType::Longvarbinary => -4,
            WireType::Blob => 2004,
            WireType::Clob => 2005,
            WireType::Url => 70,
            WireType::TypeNull(code) => *code,
        }
    }

    /// True for types whose values travel out of band as spooled files.
    pub fn is_large_object(&self) -> bool {
        matches!(
            self,
            WireType::Binary
                | WireType::Varbinary
                | WireType::Longvarbinary
                | WireType::Blob
                | WireType::Clob
        )
    }

    /// All non-null wire types, for exhaustive codec tests.
    pub fn all_concrete() -> &'static [WireType] {
        &[
            WireType::Char,
            WireType::Varchar,
            WireType::Longvarchar,
            WireType::Numeric,
            WireType::Decimal,
            WireType::Bit,
            WireType::Tinyint,
            WireType::Smallint,
            WireType::Integer,
            WireType::Bigint,
            WireType::Real,
            WireType::Float,
            WireType::DoublePrecision,
            WireType::Date,
            WireType::Time,
            WireType::Timestamp,
            WireType::Binary,
            WireType::Varbinary,
            WireType::Longvarbinary,
            WireType::Blob,
            WireType::Clob,
            WireType::Url,
        ]
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WireType::Char => "CHAR",
            WireType::Varchar => "VARCHAR",
            WireType::Longvarchar => "LONGVARCHAR",
            WireType::Numeric => "NUMERIC",
            WireType::Decimal => "DECIMAL",
            WireType::Bit => "BIT",
            WireType::Tinyint => "TINYINT",
            WireType::Smallint => "SMALLINT",
            WireType::Integer => "INTEGER",
            WireType::Bigint => "BIGINT",
            WireType::Real => "REAL",
            WireType::Float => "FLOAT",
            WireType::DoublePrecision => "DOUBLE_PRECISION",
            WireType::Date => "DATE",
            WireType::Time => "TIME",
            WireType::Timestamp => "TIMESTAMP",
            WireType::Binary => "BINARY",
            WireType::Varbinary => "VARBINARY",
            WireType::Longvarbinary => "LONGVARBINARY",
            WireType::Blob => "BLOB",
            WireType::Clob => "CLOB",
            WireType::Url => "URL",
            WireType::TypeNull(code) => return write!(f, "TYPE_NULL{}", code),
        };
        f.write_str(s)
    }
}

impl FromStr for WireType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(code) = s.strip_prefix("TYPE_NULL") {
            let code: i32 = if code.is_empty() {
                0
            } else {
                code.parse()
                    .map_err(|_| format!("bad TYPE_NULL type code in {s:?}"))?
            };
            return Ok(WireType::TypeNull(code));
        }
        match s {
            "CHAR" => Ok(WireType::Char),
            "VARCHAR" => Ok(WireType::Varchar),
            "LONGVARCHAR" => Ok(WireType::Longvarchar),
            "NUMERIC" => Ok(WireType::Numeric),
            "DECIMAL" => Ok(WireType::Decimal),
            "BIT" => Ok(WireType::Bit),
            "TINYINT" => Ok(WireType::Tinyint),
            "SMALLINT" => Ok(WireType::Smallint),
            "INTEGER" => Ok(WireType::Integer),
            "BIGINT" => Ok(WireType::Bigint),
            "REAL" => Ok(WireType::Real),
            "FLOAT" => Ok(WireType::Float),
            "DOUBLE_PRECISION" => Ok(WireType::DoublePrecision),
            "DATE" => Ok(WireType::Date),
            "TIME" => Ok(WireType::Time),
            "TIMESTAMP" => Ok(WireType::Timestamp),
            "BINARY" => Ok(WireType::Binary),
            "VARBINARY" => Ok(WireType::Varbinary),
            "LONGVARBINARY" => Ok(WireType::Longvarbinary),
            "BLOB" => Ok(WireType::Blob),
            "CLOB" => Ok(WireType::Clob),
            "URL" => Ok(WireType::Url),
            other => Err(format!("unsupported wire type: {other:?}")),
        }
    }
}

//! Parameter encoding and scalar cell decoding.
//!
//! Encoding turns a `(WireType, string)` pair into a native [`SqlValue`]
//! ready for the driver, or into a LOB reference the execution pipeline
//! resolves against the spool directory. Decoding renders a scalar native
//! value back to its wire string; large objects never pass through here.

use crate::types::WireType;
use crate::values::SqlValue;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlgate_commons::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("parameter {index}: {reason}")]
    BadParameter { index: usize, reason: String },
}

impl From<WireError> for GatewayError {
    fn from(err: WireError) -> Self {
        GatewayError::Parameter(err.to_string())
    }
}

/// Result of encoding one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedParam {
    /// Ready for the driver.
    Value(SqlValue),
    /// Spooled binary upload, referenced by its blob id.
    BlobRef(String),
    /// Spooled text upload, referenced by its blob id.
    ClobRef(String),
}

/// Encode one wire parameter into its native form.
///
/// `index` is only used for error reporting. Binary and CLOB wire values are
/// blob ids pointing at previously uploaded spool files; resolving them needs
/// the filestore, so they are returned as references.
pub fn encode_parameter(
    wire_type: WireType,
    index: usize,
    value: Option<&str>,
) -> Result<EncodedParam, WireError> {
    if let WireType::TypeNull(code) = wire_type {
        return Ok(EncodedParam::Value(SqlValue::Null(code)));
    }
    let raw = value.ok_or_else(|| WireError::BadParameter {
        index,
        reason: "missing value".to_string(),
    })?;
    let bad = |reason: String| WireError::BadParameter { index, reason };

    let value = match wire_type {
        WireType::Char | WireType::Varchar | WireType::Longvarchar => {
            SqlValue::Text(raw.to_string())
        }
        WireType::Numeric | WireType::Decimal => {
            raw.parse::<f64>()
                .map_err(|_| bad(format!("bad numeric value {raw:?}")))?;
            SqlValue::Decimal(raw.to_string())
        }
        WireType::Bit => match raw {
            "1" | "true" | "TRUE" => SqlValue::Bool(true),
            "0" | "false" | "FALSE" => SqlValue::Bool(false),
            other => return Err(bad(format!("bad bit value {other:?}"))),
        },
        WireType::Tinyint | WireType::Smallint => SqlValue::I16(
            raw.parse()
                .map_err(|_| bad(format!("bad smallint value {raw:?}")))?,
        ),
        WireType::Integer => SqlValue::I32(
            raw.parse()
                .map_err(|_| bad(format!("bad integer value {raw:?}")))?,
        ),
        WireType::Bigint => SqlValue::I64(
            raw.parse()
                .map_err(|_| bad(format!("bad bigint value {raw:?}")))?,
        ),
        WireType::Real => SqlValue::F32(
            raw.parse()
                .map_err(|_| bad(format!("bad real value {raw:?}")))?,
        ),
        WireType::Float | WireType::DoublePrecision => SqlValue::F64(
            raw.parse()
                .map_err(|_| bad(format!("bad double value {raw:?}")))?,
        ),
        WireType::Date => SqlValue::Date(parse_epoch_millis(raw, DateKind::Date).map_err(bad)?),
        WireType::Time => SqlValue::Time(parse_epoch_millis(raw, DateKind::Time).map_err(bad)?),
        WireType::Timestamp => {
            SqlValue::Timestamp(parse_epoch_millis(raw, DateKind::Timestamp).map_err(bad)?)
        }
        WireType::Binary | WireType::Varbinary | WireType::Longvarbinary | WireType::Blob => {
            return Ok(EncodedParam::BlobRef(raw.to_string()));
        }
        WireType::Clob => return Ok(EncodedParam::ClobRef(raw.to_string())),
        WireType::Url => SqlValue::Url(raw.to_string()),
        WireType::TypeNull(_) => unreachable!("handled above"),
    };
    Ok(EncodedParam::Value(value))
}

enum DateKind {
    Date,
    Time,
    Timestamp,
}

/// Temporal wire values are epoch milliseconds; ISO-8601 text is accepted as
/// a convenience and normalized to millis.
fn parse_epoch_millis(raw: &str, kind: DateKind) -> Result<i64, String> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    match kind {
        DateKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis())
            .map_err(|_| format!("bad date value {raw:?}")),
        DateKind::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .map(|t| t.signed_duration_since(NaiveTime::MIN).num_milliseconds())
            .map_err(|_| format!("bad time value {raw:?}")),
        DateKind::Timestamp => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.and_utc().timestamp_millis())
            .map_err(|_| format!("bad timestamp value {raw:?}")),
    }
}

/// Render a scalar native value back to its wire string.
///
/// Returns `None` for values that must not be inlined (bytes, arrays, row
/// ids); the result encoder handles those out of band. A typed NULL renders
/// as the literal `"NULL"` string, which is distinct from an absent cell.
pub fn decode_scalar(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null(_) => Some("NULL".to_string()),
        SqlValue::Bool(b) => Some(b.to_string()),
        SqlValue::I16(v) => Some(v.to_string()),
        SqlValue::I32(v) => Some(v.to_string()),
        SqlValue::I64(v) => Some(v.to_string()),
        SqlValue::F32(v) => Some(v.to_string()),
        SqlValue::F64(v) => Some(v.to_string()),
        SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::Url(s) => Some(s.clone()),
        SqlValue::Date(ms) | SqlValue::Time(ms) | SqlValue::Timestamp(ms) => Some(ms.to_string()),
        SqlValue::Bytes(_) | SqlValue::Array(_) | SqlValue::RowId(_) => None,
    }
}

/// HTML-safe encoding applied to CLOB text on upload by some clients.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`html_escape`]; `&amp;` is resolved last so escaped escapes
/// survive.
pub fn html_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

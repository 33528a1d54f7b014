//! SQL parameter and statement request models.
//!
//! Parameters arrive as indexed form fields: `param_type_1`/`param_value_1`,
//! `param_type_2`/`param_value_2` and so on, with optional
//! `param_direction_N` and `out_param_name_N` for callable statements.

use crate::codec::WireError;
use crate::types::WireType;
use std::collections::HashMap;

/// Parameter direction for callable statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    fn parse(s: &str, index: usize) -> Result<Self, WireError> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "inout" => Ok(Direction::InOut),
            other => Err(WireError::BadParameter {
                index,
                reason: format!("unknown direction {other:?}"),
            }),
        }
    }
}

/// One positional SQL parameter. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SqlParameter {
    /// 1-based position; ordering is significant.
    pub index: usize,
    pub wire_type: WireType,
    /// Textual wire value. `None` is only legal for the NULL sentinel and
    /// OUT parameters.
    pub value: Option<String>,
    pub direction: Direction,
    /// Name to report an OUT/INOUT value under.
    pub out_name: Option<String>,
}

impl SqlParameter {
    /// Validates the IN-parameter invariant: a non-null value unless the wire
    /// type is the explicit NULL sentinel.
    fn check(self) -> Result<Self, WireError> {
        let needs_value = self.direction != Direction::Out
            && !matches!(self.wire_type, WireType::TypeNull(_));
        if needs_value && self.value.is_none() {
            return Err(WireError::BadParameter {
                index: self.index,
                reason: "missing value for IN parameter".to_string(),
            });
        }
        Ok(self)
    }

    /// Extracts the ordered parameter list from a form-field map.
    ///
    /// Scanning stops at the first index with no `param_type_N` field, so the
    /// list is dense by construction.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Vec<SqlParameter>, WireError> {
        let mut params = Vec::new();
        for index in 1.. {
            let Some(type_str) = form.get(&format!("param_type_{index}")) else {
                break;
            };
            let wire_type: WireType =
                type_str
                    .parse()
                    .map_err(|reason| WireError::BadParameter { index, reason })?;
            let direction = match form.get(&format!("param_direction_{index}")) {
                Some(d) => Direction::parse(d, index)?,
                None => Direction::In,
            };
            let param = SqlParameter {
                index,
                wire_type,
                value: form.get(&format!("param_value_{index}")).cloned(),
                direction,
                out_name: form.get(&format!("out_param_name_{index}")).cloned(),
            }
            .check()?;
            params.push(param);
        }
        Ok(params)
    }
}

/// A statement execution request after form decoding.
#[derive(Debug, Clone)]
pub struct StatementRequest {
    pub sql: String,
    pub prepared: bool,
    pub parameters: Vec<SqlParameter>,
    /// Statement texts for `execute_batch`.
    pub batch: Option<Vec<String>>,
}

impl StatementRequest {
    /// Snapshot of parameter types and values for audit and error reporting.
    pub fn parameter_snapshot(&self) -> String {
        let parts: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "{}={} ({})",
                    p.index,
                    p.value.as_deref().unwrap_or("<null>"),
                    p.wire_type
                )
            })
            .collect();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_dense_extraction_in_order() {
        let form = form(&[
            ("param_type_1", "INTEGER"),
            ("param_value_1", "42"),
            ("param_type_2", "VARCHAR"),
            ("param_value_2", "joe"),
        ]);
        let params = SqlParameter::from_form(&form).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].wire_type, WireType::Integer);
        assert_eq!(params[1].value.as_deref(), Some("joe"));
    }

    #[test]
    fn test_extraction_stops_at_gap() {
        let form = form(&[
            ("param_type_1", "INTEGER"),
            ("param_value_1", "1"),
            ("param_type_3", "INTEGER"),
            ("param_value_3", "3"),
        ]);
        let params = SqlParameter::from_form(&form).unwrap();
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_in_parameter_requires_value() {
        let form = form(&[("param_type_1", "VARCHAR")]);
        let err = SqlParameter::from_form(&form).unwrap_err();
        assert!(matches!(err, WireError::BadParameter { index: 1, .. }));
    }

    #[test]
    fn test_null_sentinel_needs_no_value() {
        let form = form(&[("param_type_1", "TYPE_NULL12")]);
        let params = SqlParameter::from_form(&form).unwrap();
        assert_eq!(params[0].wire_type, WireType::TypeNull(12));
        assert!(params[0].value.is_none());
    }

    #[test]
    fn test_out_parameter_needs_no_value() {
        let form = form(&[
            ("param_type_1", "INTEGER"),
            ("param_direction_1", "out"),
            ("out_param_name_1", "total"),
        ]);
        let params = SqlParameter::from_form(&form).unwrap();
        assert_eq!(params[0].direction, Direction::Out);
        assert_eq!(params[0].out_name.as_deref(), Some("total"));
    }

    #[test]
    fn test_unknown_type_names_offending_index() {
        let form = form(&[
            ("param_type_1", "INTEGER"),
            ("param_value_1", "1"),
            ("param_type_2", "FANCY"),
            ("param_value_2", "x"),
        ]);
        let err = SqlParameter::from_form(&form).unwrap_err();
        match err {
            WireError::BadParameter { index, reason } => {
                assert_eq!(index, 2);
                assert!(reason.contains("FANCY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

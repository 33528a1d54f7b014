//! Gateway-wide error taxonomy.
//!
//! Every error that can reach a client maps to exactly one variant here, and
//! each variant carries a stable wire code (`error_type`) plus an HTTP status.
//! Inner layers construct the precise variant; only the outermost dispatch
//! boundary is allowed to fold unanticipated failures into [`GatewayError::Internal`].

use thiserror::Error;

/// Result alias used across the sqlgate crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classified gateway errors.
///
/// Propagation rules:
/// - `Parse` / `Parameter` / `NotFound` are detected and reported without side
///   effects.
/// - `Denied` is only constructed after the denying firewall's audit hook ran.
/// - `Database` is only constructed after the transaction was rolled back.
/// - `Internal` is reserved for the outermost boundary, which privately logs
///   the full detail before reporting generically.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Bad request path or unknown action.
    #[error("invalid request: {0}")]
    Parse(String),

    /// Bad parameter type, missing value, or unparseable value.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// Invalid credentials or invalid/expired session token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A firewall refused the statement or action.
    #[error("access denied: {0}")]
    Denied(String),

    /// Driver-level failure. The transaction has already been rolled back.
    #[error("database error: {message}")]
    Database {
        message: String,
        /// Cause chain from the driver, surfaced as the optional
        /// `stack_trace` envelope field when diagnostics are enabled.
        detail: Option<String>,
    },

    /// Missing connection, session, blob, or table.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything unanticipated. Privately logged with full detail first.
    #[error("internal error: {0}")]
    Internal(String),

    /// Worker pool saturated.
    #[error("service overloaded: {0}")]
    Overloaded(String),

    /// Request-level timeout expired.
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Wrap a driver failure, keeping its cause chain for diagnostics.
    pub fn database(message: impl Into<String>, detail: Option<String>) -> Self {
        GatewayError::Database {
            message: message.into(),
            detail,
        }
    }

    /// Stable integer code reported in the `error_type` envelope field.
    pub fn error_type(&self) -> u16 {
        match self {
            GatewayError::Parse(_) => 1,
            GatewayError::Parameter(_) => 2,
            GatewayError::Unauthorized(_) => 3,
            GatewayError::Denied(_) => 4,
            GatewayError::Database { .. } => 5,
            GatewayError::NotFound(_) => 6,
            GatewayError::Internal(_) => 7,
            GatewayError::Overloaded(_) => 8,
            GatewayError::Timeout(_) => 9,
        }
    }

    /// HTTP status code for this error class.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Parse(_) | GatewayError::Parameter(_) => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Denied(_) => 403,
            GatewayError::Database { .. } => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::Internal(_) => 500,
            GatewayError::Overloaded(_) => 503,
            GatewayError::Timeout(_) => 504,
        }
    }

    /// Diagnostic cause chain, if this variant carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::Database { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_codes_are_stable() {
        assert_eq!(GatewayError::Parse("x".into()).error_type(), 1);
        assert_eq!(GatewayError::Parameter("x".into()).error_type(), 2);
        assert_eq!(GatewayError::Unauthorized("x".into()).error_type(), 3);
        assert_eq!(GatewayError::Denied("x".into()).error_type(), 4);
        assert_eq!(GatewayError::database("x", None).error_type(), 5);
        assert_eq!(GatewayError::NotFound("x".into()).error_type(), 6);
        assert_eq!(GatewayError::Internal("x".into()).error_type(), 7);
        assert_eq!(GatewayError::Overloaded("x".into()).error_type(), 8);
        assert_eq!(GatewayError::Timeout("x".into()).error_type(), 9);
    }

    #[test]
    fn test_http_status_per_class() {
        assert_eq!(GatewayError::Parse("p".into()).http_status(), 400);
        assert_eq!(GatewayError::Unauthorized("u".into()).http_status(), 401);
        assert_eq!(GatewayError::Denied("d".into()).http_status(), 403);
        assert_eq!(GatewayError::NotFound("n".into()).http_status(), 404);
        assert_eq!(GatewayError::Internal("i".into()).http_status(), 500);
        assert_eq!(GatewayError::Overloaded("o".into()).http_status(), 503);
        assert_eq!(GatewayError::Timeout("t".into()).http_status(), 504);
        assert_eq!(GatewayError::database("db", None).http_status(), 400);
    }

    #[test]
    fn test_database_detail_preserved() {
        let err = GatewayError::database("no such table", Some("rusqlite: no such table: t".into()));
        assert_eq!(err.detail(), Some("rusqlite: no such table: t"));
        assert!(GatewayError::Parse("p".into()).detail().is_none());
    }
}

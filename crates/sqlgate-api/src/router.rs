//! Request path router.
//!
//! Client request paths are opaque: the action and its identifiers are
//! carried in fixed literal segments, not in a declared route table. Three
//! shapes are recognized:
//!
//! - login: `.../database/{db}/username/{user}/login` (legacy `/connect`)
//! - version probe: `.../get_version`
//! - session-scoped: `.../session/{sid}[/connection/{cid}]/{op}[/{value}]`
//!
//! Matching is by literal segments. Ordering matters where suffixes overlap:
//! `/disconnect` must be tested before `/connect`.

use sqlgate_commons::{GatewayError, GatewayResult};

/// Metadata query selector, the value tail of `metadata_query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOp {
    /// Table and view names, optionally filtered by a LIKE pattern.
    TableNames(Option<String>),
    /// Column details of one table.
    Table(String),
}

/// The operation requested on an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Logout,
    Close,
    GetConnection,
    Execute,
    ExecuteQuery,
    ExecuteUpdate,
    ExecuteBatch,
    Commit,
    Rollback,
    SetAutoCommit(bool),
    SetReadOnly(bool),
    SetHoldability(String),
    SetTransactionIsolation(String),
    /// `None` asks the server to generate a savepoint name.
    SavepointSet(Option<String>),
    SavepointRollback(String),
    SavepointRelease(String),
    BlobUpload,
    BlobDownload(String),
    GetBlobLength(String),
    MetadataQuery(MetadataOp),
}

impl SessionAction {
    /// Actions that manipulate transaction or connection state, refused in
    /// stateless mode where no state survives the request.
    pub fn requires_stateful(&self) -> bool {
        matches!(
            self,
            SessionAction::GetConnection
                | SessionAction::Close
                | SessionAction::Commit
                | SessionAction::Rollback
                | SessionAction::SetAutoCommit(_)
                | SessionAction::SetReadOnly(_)
                | SessionAction::SetHoldability(_)
                | SessionAction::SetTransactionIsolation(_)
                | SessionAction::SavepointSet(_)
                | SessionAction::SavepointRollback(_)
                | SessionAction::SavepointRelease(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub session_id: String,
    pub connection_id: Option<String>,
    pub action: SessionAction,
}

/// A fully parsed request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRequest {
    Login { database: String, username: String },
    Version,
    Session(SessionRequest),
}

/// Parse a request path into its logical action.
pub fn parse_path(path: &str) -> GatewayResult<ParsedRequest> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.ends_with("/get_version") {
        return Ok(ParsedRequest::Version);
    }
    // `/disconnect` before `/connect`: the latter is a suffix of the former.
    let login_shaped = !trimmed.ends_with("/disconnect")
        && (trimmed.ends_with("/login") || trimmed.ends_with("/connect"));
    if login_shaped {
        return parse_login(trimmed);
    }
    if let Some(rest) = tail_after(trimmed, "/session/") {
        return parse_session(rest);
    }
    Err(unknown(path))
}

fn unknown(path: &str) -> GatewayError {
    let tail = path.rsplit('/').next().unwrap_or(path);
    GatewayError::Parse(format!("unknown action {tail:?}"))
}

fn tail_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    path.find(marker).map(|i| &path[i + marker.len()..])
}

fn parse_login(path: &str) -> GatewayResult<ParsedRequest> {
    let after_db = tail_after(path, "/database/")
        .ok_or_else(|| GatewayError::Parse("login path missing /database/ segment".to_string()))?;
    let (database, after) = after_db
        .split_once('/')
        .ok_or_else(|| GatewayError::Parse("login path missing /username/ segment".to_string()))?;
    let after_user = tail_after(after, "username/")
        .filter(|_| after.starts_with("username/"))
        .ok_or_else(|| GatewayError::Parse("login path missing /username/ segment".to_string()))?;
    let (username, _) = after_user
        .split_once('/')
        .ok_or_else(|| GatewayError::Parse("login path missing action segment".to_string()))?;
    if database.is_empty() || username.is_empty() {
        return Err(GatewayError::Parse(
            "login path has empty database or username".to_string(),
        ));
    }
    Ok(ParsedRequest::Login {
        database: database.to_string(),
        username: username.to_string(),
    })
}

fn parse_session(rest: &str) -> GatewayResult<ParsedRequest> {
    let mut segments = rest.split('/');
    let session_id = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::Parse("missing session id".to_string()))?
        .to_string();

    let mut segments = segments.peekable();
    let connection_id = if segments.peek() == Some(&"connection") {
        segments.next();
        Some(
            segments
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| GatewayError::Parse("missing connection id".to_string()))?
                .to_string(),
        )
    } else {
        None
    };

    let op = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::Parse("missing action segment".to_string()))?;
    let value = segments.next().filter(|s| !s.is_empty());
    let extra = segments.next().filter(|s| !s.is_empty());

    let action = match (op, value, extra) {
        ("logout" | "disconnect", None, _) => SessionAction::Logout,
        ("close", None, _) => SessionAction::Close,
        ("get_connection", None, _) => SessionAction::GetConnection,
        ("execute", None, _) => SessionAction::Execute,
        ("execute_query", None, _) => SessionAction::ExecuteQuery,
        ("execute_update", None, _) => SessionAction::ExecuteUpdate,
        ("execute_batch", None, _) => SessionAction::ExecuteBatch,
        ("commit", None, _) => SessionAction::Commit,
        ("rollback", None, _) => SessionAction::Rollback,
        ("set_auto_commit", Some(v), _) => SessionAction::SetAutoCommit(parse_bool(op, v)?),
        ("set_read_only", Some(v), _) => SessionAction::SetReadOnly(parse_bool(op, v)?),
        ("set_holdability", Some(v), _) => SessionAction::SetHoldability(v.to_string()),
        ("set_transaction_isolation_level", Some(v), _) => {
            SessionAction::SetTransactionIsolation(v.to_string())
        }
        ("set_savepoint", name, _) => SessionAction::SavepointSet(name.map(str::to_string)),
        ("rollback_savepoint", Some(name), _) => {
            SessionAction::SavepointRollback(name.to_string())
        }
        ("release_savepoint", Some(name), _) => SessionAction::SavepointRelease(name.to_string()),
        ("blob_upload", None, _) => SessionAction::BlobUpload,
        ("blob_download", Some(id), _) => SessionAction::BlobDownload(id.to_string()),
        ("get_blob_length", Some(id), _) => SessionAction::GetBlobLength(id.to_string()),
        ("metadata_query", Some("table_names" | "get_table_names"), filter) => {
            SessionAction::MetadataQuery(MetadataOp::TableNames(filter.map(str::to_string)))
        }
        ("metadata_query", Some("table" | "get_table"), Some(name)) => {
            SessionAction::MetadataQuery(MetadataOp::Table(name.to_string()))
        }
        _ => return Err(unknown(op)),
    };
    Ok(ParsedRequest::Session(SessionRequest {
        session_id,
        connection_id,
        action,
    }))
}

fn parse_bool(op: &str, value: &str) -> GatewayResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(GatewayError::Parse(format!(
            "{op} expects true or false, got {other:?}"
        ))),
    }
}

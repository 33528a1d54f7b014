//! Type-safe identifiers for users, sessions, and connections.
//!
//! `UserId` validates against path traversal because user ids become blob
//! directory names on disk. Session and connection ids are opaque tokens
//! issued elsewhere; the newtypes only prevent accidental mixups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for a username.
///
/// The inner string is used as an on-disk directory component for spooled
/// large objects, so separators, `..`, and null bytes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a UserId, rejecting ids unusable as a path component.
    pub fn try_new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.is_empty() {
            return Err("username cannot be empty".to_string());
        }
        if id.contains("..") || id.contains('/') || id.contains('\\') || id.contains('\0') {
            return Err(format!("username contains invalid characters: {id:?}"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque session token issued by the session token provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection identifier derived from the native connection's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Opaque session token issue, verification, and resolution.
//!
//! The core treats session tokens as opaque; only the provider can resolve
//! one back to `(username, database)`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlgate_commons::{SessionId, UserId};
use uuid::Uuid;

/// What a session token resolves to.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: UserId,
    pub database: String,
    pub created_at: DateTime<Utc>,
}

pub trait SessionTokenProvider: Send + Sync {
    /// Issue a fresh token for a successfully authenticated login.
    fn generate(&self, username: &UserId, database: &str) -> SessionId;

    /// Verify a token belongs to the given user. Called on every non-login
    /// request.
    fn verify(&self, session_id: &SessionId, username: &UserId) -> bool;

    /// Resolve a token to its session info, if it is live.
    fn resolve(&self, session_id: &SessionId) -> Option<SessionInfo>;

    /// Drop a token at logout or external expiry.
    fn invalidate(&self, session_id: &SessionId);
}

/// In-memory provider issuing random UUID tokens.
#[derive(Default)]
pub struct UuidSessionProvider {
    sessions: DashMap<String, SessionInfo>,
}

impl UuidSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionTokenProvider for UuidSessionProvider {
    fn generate(&self, username: &UserId, database: &str) -> SessionId {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            SessionInfo {
                username: username.clone(),
                database: database.to_string(),
                created_at: Utc::now(),
            },
        );
        SessionId::new(token)
    }

    fn verify(&self, session_id: &SessionId, username: &UserId) -> bool {
        self.sessions
            .get(session_id.as_str())
            .is_some_and(|info| &info.username == username)
    }

    fn resolve(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions
            .get(session_id.as_str())
            .map(|info| info.clone())
    }

    fn invalidate(&self, session_id: &SessionId) {
        self.sessions.remove(session_id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_verify_resolve_invalidate() {
        let provider = UuidSessionProvider::new();
        let joe = UserId::try_new("joe").unwrap();
        let ann = UserId::try_new("ann").unwrap();

        let token = provider.generate(&joe, "testdb");
        assert!(provider.verify(&token, &joe));
        assert!(!provider.verify(&token, &ann));

        let info = provider.resolve(&token).unwrap();
        assert_eq!(info.database, "testdb");
        assert_eq!(info.username, joe);

        provider.invalidate(&token);
        assert!(!provider.verify(&token, &joe));
        assert!(provider.resolve(&token).is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        let provider = UuidSessionProvider::new();
        let joe = UserId::try_new("joe").unwrap();
        let a = provider.generate(&joe, "db");
        let b = provider.generate(&joe, "db");
        assert_ne!(a, b);
    }
}

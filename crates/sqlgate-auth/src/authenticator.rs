//! Credential authentication at login time.

use sqlgate_commons::UserId;
use std::collections::HashMap;

/// Checks credentials presented with a login request.
pub trait Authenticator: Send + Sync {
    /// Registry name of this implementation.
    fn name(&self) -> &'static str;

    /// True when the credentials are valid for this database.
    fn authenticate(
        &self,
        user: &UserId,
        password: &str,
        database: &str,
        client_ip: Option<&str>,
    ) -> bool;
}

/// Accepts any credentials. The out-of-the-box default, matching a gateway
/// that delegates real authentication to the network perimeter.
pub struct PermissiveAuthenticator;

impl Authenticator for PermissiveAuthenticator {
    fn name(&self) -> &'static str {
        "permissive"
    }

    fn authenticate(&self, _: &UserId, _: &str, _: &str, _: Option<&str>) -> bool {
        true
    }
}

/// Checks against a fixed username → password table from `server.toml`.
pub struct StaticUserAuthenticator {
    users: HashMap<String, String>,
}

impl StaticUserAuthenticator {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

impl Authenticator for StaticUserAuthenticator {
    fn name(&self) -> &'static str {
        "static"
    }

    fn authenticate(
        &self,
        user: &UserId,
        password: &str,
        _database: &str,
        _client_ip: Option<&str>,
    ) -> bool {
        self.users
            .get(user.as_str())
            .is_some_and(|expected| expected == password)
    }
}

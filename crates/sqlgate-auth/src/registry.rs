//! Name → implementation resolution at startup.
//!
//! Configuration refers to firewalls and authenticators by name; the registry
//! turns those names into live instances once, when the application context
//! is built. An unknown name is a configuration error, reported before the
//! server starts serving.

use crate::authenticator::{Authenticator, PermissiveAuthenticator, StaticUserAuthenticator};
use crate::firewall::{
    AllowAllFirewall, DenyDdlFirewall, DenyMetadataFirewall, ReadOnlyFirewall, SqlFirewall,
};
use sqlgate_commons::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Build the ordered firewall chain from configured names. An empty list
/// yields the allow-all default.
pub fn build_firewalls(names: &[String]) -> GatewayResult<Vec<Arc<dyn SqlFirewall>>> {
    if names.is_empty() {
        return Ok(vec![Arc::new(AllowAllFirewall)]);
    }
    names
        .iter()
        .map(|name| -> GatewayResult<Arc<dyn SqlFirewall>> {
            match name.as_str() {
                "allow_all" => Ok(Arc::new(AllowAllFirewall)),
                "read_only" => Ok(Arc::new(ReadOnlyFirewall)),
                "deny_ddl" => Ok(Arc::new(DenyDdlFirewall)),
                "deny_metadata" => Ok(Arc::new(DenyMetadataFirewall)),
                other => Err(GatewayError::Internal(format!(
                    "unknown firewall {other:?} in configuration"
                ))),
            }
        })
        .collect()
}

/// Build the configured authenticator.
pub fn build_authenticator(
    name: &str,
    static_users: &HashMap<String, String>,
) -> GatewayResult<Arc<dyn Authenticator>> {
    match name {
        "permissive" => Ok(Arc::new(PermissiveAuthenticator)),
        "static" => Ok(Arc::new(StaticUserAuthenticator::new(static_users.clone()))),
        other => Err(GatewayError::Internal(format!(
            "unknown authenticator {other:?} in configuration"
        ))),
    }
}

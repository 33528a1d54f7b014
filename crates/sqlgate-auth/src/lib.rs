//! # sqlgate-auth
//!
//! The pluggable security collaborators: credential authentication at login,
//! opaque session token issue/verify/resolve, and the ordered SQL firewall
//! chain consulted before every statement execution.
//!
//! Implementations are resolved by name from configuration at startup through
//! [`registry`], an explicit factory with no runtime class loading.

pub mod authenticator;
pub mod firewall;
pub mod registry;
pub mod session_provider;

pub use authenticator::{Authenticator, PermissiveAuthenticator, StaticUserAuthenticator};
pub use firewall::{
    AllowAllFirewall, DenyDdlFirewall, DenyMetadataFirewall, FirewallDecision, ReadOnlyFirewall,
    SqlContext, SqlFirewall,
};
pub use registry::{build_authenticator, build_firewalls};
pub use session_provider::{SessionInfo, SessionTokenProvider, UuidSessionProvider};

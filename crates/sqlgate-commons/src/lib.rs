//! # sqlgate-commons
//!
//! Shared building blocks for the sqlgate workspace: the cross-crate error
//! taxonomy ([`GatewayError`]) and type-safe identifiers used to key sessions
//! and connections.

pub mod errors;
pub mod ids;

pub use errors::{GatewayError, GatewayResult};
pub use ids::{ConnectionId, SessionId, UserId};

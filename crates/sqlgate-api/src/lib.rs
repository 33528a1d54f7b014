//! # sqlgate-api
//!
//! The HTTP surface of the gateway: the opaque-path router, the JSON
//! response envelopes, and the actix handlers dispatching every action to
//! the execution core.

pub mod handlers;
pub mod models;
pub mod router;
pub mod routes;
pub mod stream;

pub use router::{parse_path, MetadataOp, ParsedRequest, SessionAction, SessionRequest};
pub use routes::configure_routes;

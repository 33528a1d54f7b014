//! # sqlgate-wire
//!
//! The type-marshalling codec between the HTTP text wire format and native
//! SQL values. The wire side of every value is a string tagged with a
//! [`WireType`] keyword; the native side is a [`SqlValue`]. Large objects are
//! never carried inline: the wire value for a BLOB/CLOB parameter is a spooled
//! file id, resolved by the execution pipeline.

pub mod codec;
pub mod columns;
pub mod params;
pub mod types;
pub mod values;

pub use codec::{encode_parameter, html_escape, html_unescape, EncodedParam, WireError};
pub use columns::ResultColumn;
pub use params::{Direction, SqlParameter, StatementRequest};
pub use types::WireType;
pub use values::SqlValue;

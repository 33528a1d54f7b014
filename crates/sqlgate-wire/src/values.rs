//! Native value model shared between the codec, the driver boundary, and the
//! result encoder.

/// A native SQL value as seen by the delegate driver.
///
/// Date/time variants carry epoch milliseconds; `Decimal` stays textual so
/// precision survives the trip through the gateway untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Typed SQL NULL with the native type code of its column.
    Null(i32),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Arbitrary-precision numeric kept as its textual form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Epoch milliseconds.
    Date(i64),
    /// Epoch milliseconds.
    Time(i64),
    /// Epoch milliseconds.
    Timestamp(i64),
    Url(String),
    /// Array column rendered as a nested structure by the encoder.
    Array(Vec<SqlValue>),
    /// Driver row identifier, registered in the connection's rowid registry.
    RowId(i64),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }
}

//! # sqlgate-driver
//!
//! The seam between the gateway core and the backing SQL database. The core
//! only ever talks to [`DriverConnection`] trait objects obtained from a
//! [`DatabaseConfigurator`]; it never constructs connections itself and never
//! sees driver-specific types.
//!
//! The traits are synchronous by design: every call happens on the bounded
//! worker pool, never on a hosting thread.

pub mod configurator;
pub mod error;
pub mod sqlite;

pub use configurator::DatabaseConfigurator;
pub use error::{DriverError, DriverResult};
pub use sqlite::{SqliteConfigurator, SqliteConnection};

use sqlgate_wire::{ResultColumn, SqlValue};

/// What a raw `execute` call produced, reported by the driver after the
/// fact. This, not the requested action name, decides the response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The statement was a modification; carries the affected-row count.
    UpdateCount(u64),
    /// The statement produced a result set, already streamed to the sink;
    /// carries the row count.
    ResultSet(u64),
}

/// Receives a result set one row at a time, in a single pass.
///
/// `columns` is called exactly once, before the first row.
pub trait RowSink {
    fn columns(&mut self, columns: &[ResultColumn]) -> DriverResult<()>;
    /// A cell of `None` means the driver produced no value at all, distinct
    /// from a typed SQL NULL (`Some(SqlValue::Null(_))`).
    fn row(&mut self, cells: &[Option<SqlValue>]) -> DriverResult<()>;
}

/// One live native database connection.
pub trait DriverConnection: Send {
    /// Identity token of the native connection, unique per process.
    /// Connection ids handed to clients derive from this.
    fn connection_token(&self) -> u64;

    /// Run a query, streaming rows into `sink`. Returns the row count.
    fn execute_query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<u64>;

    /// Run a modifying statement. Returns the affected-row count.
    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64>;

    /// Raw execute: the driver decides afterwards whether an update count or
    /// a result set came back.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<ExecuteOutcome>;

    /// Run a batch of statement texts, returning per-statement update counts.
    fn execute_batch(&mut self, statements: &[String]) -> DriverResult<Vec<u64>>;

    fn commit(&mut self) -> DriverResult<()>;
    fn rollback(&mut self) -> DriverResult<()>;
    fn set_auto_commit(&mut self, on: bool) -> DriverResult<()>;
    fn auto_commit(&self) -> bool;
    fn set_read_only(&mut self, on: bool) -> DriverResult<()>;
    /// Cursor holdability is advisory for backends without the concept.
    fn set_holdability(&mut self, holdability: &str) -> DriverResult<()>;
    fn set_transaction_isolation(&mut self, level: &str) -> DriverResult<()>;

    fn savepoint_set(&mut self, name: &str) -> DriverResult<()>;
    fn savepoint_rollback(&mut self, name: &str) -> DriverResult<()>;
    fn savepoint_release(&mut self, name: &str) -> DriverResult<()>;

    /// Table/view names visible to this connection, optionally filtered by a
    /// SQL LIKE pattern.
    fn table_names(&mut self, filter: Option<&str>) -> DriverResult<Vec<String>>;
    /// Column metadata for one table. `DriverError::NotFound` if absent.
    fn table_columns(&mut self, table: &str) -> DriverResult<Vec<ResultColumn>>;

    /// Connectivity probe: a plain round-trip query.
    fn ping(&mut self) -> DriverResult<()>;
}

//! Shared test doubles for the core crate.

use sqlgate_driver::{DriverConnection, DriverError, DriverResult, ExecuteOutcome, RowSink};
use sqlgate_wire::{ResultColumn, SqlValue};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Scripted driver connection recording every call made against it.
pub struct MockConnection {
    token: u64,
    pub calls: Vec<String>,
    pub auto_commit: bool,
    /// When set, every execute-family call fails with this message.
    pub fail_with: Option<String>,
    /// Rows returned by `execute_query`, one cell per row.
    pub rows: Vec<Option<SqlValue>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::with_token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn with_token(token: u64) -> Self {
        Self {
            token,
            calls: Vec::new(),
            auto_commit: true,
            fail_with: None,
            rows: Vec::new(),
        }
    }

    fn check(&mut self, call: &str) -> DriverResult<()> {
        self.calls.push(call.to_string());
        match &self.fail_with {
            Some(message) => Err(DriverError::Sql {
                message: message.clone(),
                detail: None,
            }),
            None => Ok(()),
        }
    }
}

impl DriverConnection for MockConnection {
    fn connection_token(&self) -> u64 {
        self.token
    }

    fn execute_query(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<u64> {
        self.check(&format!("query:{sql}"))?;
        sink.columns(&[ResultColumn::new(12, "VARCHAR", "c1", Some("t".to_string()))])?;
        for cell in &self.rows {
            sink.row(&[cell.clone()])?;
        }
        Ok(self.rows.len() as u64)
    }

    fn execute_update(&mut self, sql: &str, _params: &[SqlValue]) -> DriverResult<u64> {
        self.check(&format!("update:{sql}"))?;
        Ok(1)
    }

    fn execute(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
        _sink: &mut dyn RowSink,
    ) -> DriverResult<ExecuteOutcome> {
        self.check(&format!("execute:{sql}"))?;
        Ok(ExecuteOutcome::UpdateCount(1))
    }

    fn execute_batch(&mut self, statements: &[String]) -> DriverResult<Vec<u64>> {
        self.check(&format!("batch:{}", statements.len()))?;
        Ok(vec![1; statements.len()])
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.check("commit")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.calls.push("rollback".to_string());
        Ok(())
    }

    fn set_auto_commit(&mut self, on: bool) -> DriverResult<()> {
        self.auto_commit = on;
        self.check(&format!("set_auto_commit:{on}"))
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_read_only(&mut self, on: bool) -> DriverResult<()> {
        self.check(&format!("set_read_only:{on}"))
    }

    fn set_holdability(&mut self, holdability: &str) -> DriverResult<()> {
        self.check(&format!("set_holdability:{holdability}"))
    }

    fn set_transaction_isolation(&mut self, level: &str) -> DriverResult<()> {
        self.check(&format!("set_transaction_isolation:{level}"))
    }

    fn savepoint_set(&mut self, name: &str) -> DriverResult<()> {
        self.check(&format!("savepoint_set:{name}"))
    }

    fn savepoint_rollback(&mut self, name: &str) -> DriverResult<()> {
        self.check(&format!("savepoint_rollback:{name}"))
    }

    fn savepoint_release(&mut self, name: &str) -> DriverResult<()> {
        self.check(&format!("savepoint_release:{name}"))
    }

    fn table_names(&mut self, _filter: Option<&str>) -> DriverResult<Vec<String>> {
        self.check("table_names")?;
        Ok(vec!["t".to_string()])
    }

    fn table_columns(&mut self, table: &str) -> DriverResult<Vec<ResultColumn>> {
        self.check(&format!("table_columns:{table}"))?;
        Ok(vec![ResultColumn::new(4, "INTEGER", "id", Some(table.to_string()))])
    }

    fn ping(&mut self) -> DriverResult<()> {
        self.check("ping")
    }
}

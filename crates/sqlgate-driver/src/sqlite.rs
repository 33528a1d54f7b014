//! Stock SQLite backend over rusqlite.
//!
//! SQLite has no wire protocol of its own, which makes it the natural
//! embedded backend for the gateway: one database file per served database
//! name, one `rusqlite::Connection` per [`SqliteConnection`].
//!
//! Transaction control is mapped onto explicit `BEGIN`/`COMMIT`/`ROLLBACK`
//! because rusqlite's scoped `Transaction` type cannot span requests the way
//! a stateful session requires.

use crate::configurator::DatabaseConfigurator;
use crate::error::{DriverError, DriverResult};
use crate::{DriverConnection, ExecuteOutcome, RowSink};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use sqlgate_commons::UserId;
use sqlgate_wire::{ResultColumn, SqlValue};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Configurator serving one named database from one SQLite file.
pub struct SqliteConfigurator {
    database: String,
    db_path: PathBuf,
    blob_base: PathBuf,
}

impl SqliteConfigurator {
    pub fn new(
        database: impl Into<String>,
        db_path: impl Into<PathBuf>,
        blob_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            database: database.into(),
            db_path: db_path.into(),
            blob_base: blob_base.into(),
        }
    }
}

impl DatabaseConfigurator for SqliteConfigurator {
    fn database(&self) -> &str {
        &self.database
    }

    fn connection(&self) -> DriverResult<Box<dyn DriverConnection>> {
        Ok(Box::new(SqliteConnection::open(&self.db_path)?))
    }

    fn blob_directory(&self, user: &UserId) -> PathBuf {
        self.blob_base.join(&self.database).join(user.as_str())
    }

    fn log_target(&self) -> String {
        format!("sqlgate::db::{}", self.database)
    }
}

static NEXT_CONNECTION_TOKEN: AtomicU64 = AtomicU64::new(1);

/// One live SQLite connection.
pub struct SqliteConnection {
    conn: Connection,
    token: u64,
    auto_commit: bool,
}

impl SqliteConnection {
    pub fn open(path: &Path) -> DriverResult<Self> {
        let conn = Connection::open(path)?;
        // Foreign keys are opt-in per connection in SQLite.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            token: NEXT_CONNECTION_TOKEN.fetch_add(1, Ordering::Relaxed),
            auto_commit: true,
        })
    }

    fn bind_values(params: &[SqlValue]) -> DriverResult<Vec<Value>> {
        params.iter().map(to_sqlite_value).collect()
    }

    /// Stream one prepared statement's rows into the sink.
    fn run_query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<u64> {
        let values = Self::bind_values(params)?;
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<ResultColumn> = stmt
            .columns()
            .iter()
            .map(|c| {
                let decl = c.decl_type().unwrap_or("");
                ResultColumn::new(decl_type_code(decl), decl.to_uppercase(), c.name(), None)
            })
            .collect();
        sink.columns(&columns)?;

        let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
        let mut count = 0u64;
        let mut cells: Vec<Option<SqlValue>> = Vec::with_capacity(columns.len());
        while let Some(row) = rows.next()? {
            cells.clear();
            for (i, col) in columns.iter().enumerate() {
                cells.push(Some(cell_value(row.get_ref(i)?, col)));
            }
            sink.row(&cells)?;
            count += 1;
        }
        Ok(count)
    }
}

impl DriverConnection for SqliteConnection {
    fn connection_token(&self) -> u64 {
        self.token
    }

    fn execute_query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<u64> {
        self.run_query(sql, params, sink)
    }

    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64> {
        let values = Self::bind_values(params)?;
        let mut stmt = self.conn.prepare(sql)?;
        let changed = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        Ok(changed as u64)
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        sink: &mut dyn RowSink,
    ) -> DriverResult<ExecuteOutcome> {
        // SQLite reports the shape up front via the column count; the
        // contract is the same either way: the driver, not the caller,
        // decides what came back.
        let produces_rows = self.conn.prepare(sql)?.column_count() > 0;
        if produces_rows {
            let rows = self.run_query(sql, params, sink)?;
            Ok(ExecuteOutcome::ResultSet(rows))
        } else {
            let changed = self.execute_update(sql, params)?;
            Ok(ExecuteOutcome::UpdateCount(changed))
        }
    }

    fn execute_batch(&mut self, statements: &[String]) -> DriverResult<Vec<u64>> {
        let mut counts = Vec::with_capacity(statements.len());
        for sql in statements {
            counts.push(self.conn.execute(sql, [])? as u64);
        }
        Ok(counts)
    }

    fn commit(&mut self) -> DriverResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        if !self.auto_commit {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        if !self.auto_commit {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn set_auto_commit(&mut self, on: bool) -> DriverResult<()> {
        if on == self.auto_commit {
            return Ok(());
        }
        if on {
            // Leaving manual mode commits pending work, JDBC-style.
            if !self.conn.is_autocommit() {
                self.conn.execute_batch("COMMIT")?;
            }
        } else {
            self.conn.execute_batch("BEGIN")?;
        }
        self.auto_commit = on;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_read_only(&mut self, on: bool) -> DriverResult<()> {
        let pragma = if on {
            "PRAGMA query_only = ON;"
        } else {
            "PRAGMA query_only = OFF;"
        };
        self.conn.execute_batch(pragma)?;
        Ok(())
    }

    fn set_holdability(&mut self, holdability: &str) -> DriverResult<()> {
        match holdability {
            "hold_cursors_over_commit" | "close_cursors_at_commit" => Ok(()),
            other => Err(DriverError::Unsupported(format!(
                "unknown holdability {other:?}"
            ))),
        }
    }

    fn set_transaction_isolation(&mut self, level: &str) -> DriverResult<()> {
        match level {
            "read_uncommitted" => {
                self.conn.execute_batch("PRAGMA read_uncommitted = ON;")?;
                Ok(())
            }
            "read_committed" | "repeatable_read" | "serializable" => {
                // SQLite runs serializable; stricter-or-equal requests are
                // satisfied as-is.
                self.conn.execute_batch("PRAGMA read_uncommitted = OFF;")?;
                Ok(())
            }
            other => Err(DriverError::Unsupported(format!(
                "unknown transaction isolation level {other:?}"
            ))),
        }
    }

    fn savepoint_set(&mut self, name: &str) -> DriverResult<()> {
        let name = valid_identifier(name)?;
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    fn savepoint_rollback(&mut self, name: &str) -> DriverResult<()> {
        let name = valid_identifier(name)?;
        self.conn.execute_batch(&format!("ROLLBACK TO {name}"))?;
        Ok(())
    }

    fn savepoint_release(&mut self, name: &str) -> DriverResult<()> {
        let name = valid_identifier(name)?;
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        Ok(())
    }

    fn table_names(&mut self, filter: Option<&str>) -> DriverResult<Vec<String>> {
        let mut names = Vec::new();
        match filter {
            Some(pattern) => {
                let mut stmt = self.conn.prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     AND name LIKE ?1 ORDER BY name",
                )?;
                let mut rows = stmt.query([pattern])?;
                while let Some(row) = rows.next()? {
                    names.push(row.get(0)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    names.push(row.get(0)?);
                }
            }
        }
        Ok(names)
    }

    fn table_columns(&mut self, table: &str) -> DriverResult<Vec<ResultColumn>> {
        let table = valid_identifier(table)?;
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DriverError::NotFound(format!("table {table:?}")));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
        let mut rows = stmt.query([])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let decl: String = row.get(2)?;
            columns.push(ResultColumn::new(
                decl_type_code(&decl),
                decl.to_uppercase(),
                name,
                Some(table.to_string()),
            ));
        }
        Ok(columns)
    }

    fn ping(&mut self) -> DriverResult<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn to_sqlite_value(value: &SqlValue) -> DriverResult<Value> {
    Ok(match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::I16(v) => Value::Integer(i64::from(*v)),
        SqlValue::I32(v) => Value::Integer(i64::from(*v)),
        SqlValue::I64(v) => Value::Integer(*v),
        SqlValue::F32(v) => Value::Real(f64::from(*v)),
        SqlValue::F64(v) => Value::Real(*v),
        // Textual binding keeps arbitrary precision intact; SQLite's column
        // affinity converts where the schema wants a number.
        SqlValue::Decimal(s) => Value::Text(s.clone()),
        SqlValue::Text(s) | SqlValue::Url(s) => Value::Text(s.clone()),
        SqlValue::Bytes(b) => Value::Blob(b.clone()),
        SqlValue::Date(ms) | SqlValue::Time(ms) | SqlValue::Timestamp(ms) => Value::Integer(*ms),
        SqlValue::Array(_) | SqlValue::RowId(_) => {
            return Err(DriverError::Unsupported(
                "SQLite cannot bind array or rowid parameters".to_string(),
            ))
        }
    })
}

/// Map a raw SQLite cell to the shared value model, steered by the declared
/// column type so temporal columns surface as epoch-millis variants.
fn cell_value(value: ValueRef<'_>, column: &ResultColumn) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null(column.type_code),
        ValueRef::Integer(v) => match column.type_code {
            91 => SqlValue::Date(v),
            92 => SqlValue::Time(v),
            93 => SqlValue::Timestamp(v),
            _ => SqlValue::I64(v),
        },
        ValueRef::Real(v) => SqlValue::F64(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    }
}

/// Declared-type → conventional type code, first keyword only so
/// `VARCHAR(40)` maps like `VARCHAR`.
fn decl_type_code(decl: &str) -> i32 {
    let head = decl
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    match head.as_str() {
        "CHAR" | "CHARACTER" => 1,
        "VARCHAR" | "TEXT" | "NVARCHAR" | "STRING" => 12,
        "NUMERIC" => 2,
        "DECIMAL" => 3,
        "BOOLEAN" | "BIT" => -7,
        "TINYINT" => -6,
        "SMALLINT" => 5,
        "INT" | "INTEGER" | "MEDIUMINT" => 4,
        "BIGINT" => -5,
        "REAL" => 7,
        "FLOAT" => 6,
        "DOUBLE" => 8,
        "DATE" => 91,
        "TIME" => 92,
        "TIMESTAMP" | "DATETIME" => 93,
        "BLOB" | "BINARY" | "VARBINARY" => 2004,
        "CLOB" => 2005,
        // Undeclared (expression columns) and exotic types fall back to the
        // generic bucket; the encoder renders them via to-string.
        "" => 1111,
        _ => 1111,
    }
}

fn valid_identifier(name: &str) -> DriverResult<&str> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(DriverError::Unsupported(format!(
            "invalid identifier {name:?}"
        )))
    }
}

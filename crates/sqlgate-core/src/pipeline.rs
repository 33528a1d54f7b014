//! Statement execution pipeline: authorize, execute, notify or roll back.
//!
//! Every SQL-bearing request flows through here. The pipeline holds the
//! firewall chain and the change listeners; connections, blob directories,
//! and log targets arrive per call in an [`ExecContext`], so one pipeline
//! instance serves every database.
//!
//! All methods are synchronous. Callers run them on the bounded worker pool
//! while holding the connection entry's lock.

use crate::classifier::{classify, StatementKind};
use crate::listener::{UpdateEvent, UpdateListener};
use log::error;
use sqlgate_auth::{FirewallDecision, SqlContext, SqlFirewall};
use sqlgate_commons::{GatewayError, GatewayResult, UserId};
use sqlgate_driver::{DriverConnection, DriverError, ExecuteOutcome, RowSink};
use sqlgate_filestore::BlobDir;
use sqlgate_wire::codec::{self, EncodedParam};
use sqlgate_wire::{Direction, SqlValue, StatementRequest};
use std::sync::Arc;

/// Per-request execution context assembled by the dispatch layer.
#[derive(Clone)]
pub struct ExecContext {
    pub username: UserId,
    pub database: String,
    pub client_ip: Option<String>,
    /// The user's spool directory; LOB parameter references resolve here.
    pub blob_dir: BlobDir,
    /// Per-database log target from the configurator.
    pub log_target: String,
    /// Reverse the HTML-safe encoding on CLOB parameter text.
    pub html_unescape_clobs: bool,
}

/// What a raw `execute` produced. The driver's after-the-fact report, not
/// the requested action name, decides the response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawOutcome {
    UpdateCount(u64),
    ResultSet(u64),
}

impl From<ExecuteOutcome> for RawOutcome {
    fn from(outcome: ExecuteOutcome) -> Self {
        match outcome {
            ExecuteOutcome::UpdateCount(n) => RawOutcome::UpdateCount(n),
            ExecuteOutcome::ResultSet(n) => RawOutcome::ResultSet(n),
        }
    }
}

pub struct StatementPipeline {
    firewalls: Vec<Arc<dyn SqlFirewall>>,
    listeners: Vec<Arc<dyn UpdateListener>>,
}

impl StatementPipeline {
    pub fn new(
        firewalls: Vec<Arc<dyn SqlFirewall>>,
        listeners: Vec<Arc<dyn UpdateListener>>,
    ) -> Self {
        Self {
            firewalls,
            listeners,
        }
    }

    /// Run the firewall chain for one statement. First denial wins: its
    /// audit hook fires and the statement never reaches the driver.
    pub fn authorize(
        &self,
        ctx: &ExecContext,
        request: &StatementRequest,
        raw_execute: bool,
    ) -> GatewayResult<()> {
        let snapshot = request.parameter_snapshot();
        let kind = classify(&request.sql);
        let sql_ctx = SqlContext {
            username: &ctx.username,
            database: &ctx.database,
            client_ip: ctx.client_ip.as_deref(),
            sql: &request.sql,
            prepared: request.prepared,
            parameter_snapshot: &snapshot,
            is_modifying: kind == StatementKind::Modifying,
            is_ddl: kind == StatementKind::Ddl,
        };
        for firewall in &self.firewalls {
            let decision = if raw_execute {
                firewall.allow_execute(&sql_ctx)
            } else {
                firewall.allow_sql(&sql_ctx)
            };
            if let FirewallDecision::Deny(reason) = decision {
                firewall.on_refused(&sql_ctx, &reason);
                return Err(GatewayError::Denied(format!(
                    "statement not allowed: {reason} (sql: {}, params: [{snapshot}])",
                    request.sql
                )));
            }
        }
        Ok(())
    }

    /// Gate a metadata query (table listing, table details). A denial fires
    /// the same audit hook as a statement denial.
    pub fn authorize_metadata(&self, ctx: &ExecContext) -> GatewayResult<()> {
        let sql_ctx = SqlContext {
            username: &ctx.username,
            database: &ctx.database,
            client_ip: ctx.client_ip.as_deref(),
            sql: "<metadata query>",
            prepared: false,
            parameter_snapshot: "",
            is_modifying: false,
            is_ddl: false,
        };
        for firewall in &self.firewalls {
            if let FirewallDecision::Deny(reason) =
                firewall.allow_metadata_query(&ctx.username, &ctx.database)
            {
                firewall.on_refused(&sql_ctx, &reason);
                return Err(GatewayError::Denied(format!(
                    "metadata query not allowed: {reason}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the request's parameters into driver values, reading LOB
    /// references back from the user's spool directory.
    pub fn resolve_parameters(
        &self,
        ctx: &ExecContext,
        request: &StatementRequest,
    ) -> GatewayResult<Vec<SqlValue>> {
        let mut values = Vec::with_capacity(request.parameters.len());
        for param in &request.parameters {
            // OUT placeholders carry nothing to send; bind a typed null so
            // positional binding stays aligned across the whole list.
            if param.direction == Direction::Out && param.value.is_none() {
                values.push(SqlValue::Null(param.wire_type.type_code()));
                continue;
            }
            let encoded =
                codec::encode_parameter(param.wire_type, param.index, param.value.as_deref())?;
            let value = match encoded {
                EncodedParam::Value(v) => v,
                EncodedParam::BlobRef(id) => SqlValue::Bytes(ctx.blob_dir.read_bytes(&id)?),
                EncodedParam::ClobRef(id) => {
                    let text = ctx.blob_dir.read_text(&id)?;
                    if ctx.html_unescape_clobs {
                        SqlValue::Text(codec::html_unescape(&text))
                    } else {
                        SqlValue::Text(text)
                    }
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    pub fn execute_update(
        &self,
        ctx: &ExecContext,
        conn: &mut dyn DriverConnection,
        request: &StatementRequest,
    ) -> GatewayResult<u64> {
        self.authorize(ctx, request, false)?;
        let params = self.resolve_parameters(ctx, request)?;
        match conn.execute_update(&request.sql, &params) {
            Ok(count) => {
                self.notify(ctx, request);
                Ok(count)
            }
            Err(e) => Err(self.fail(ctx, conn, request, e)),
        }
    }

    pub fn execute_query(
        &self,
        ctx: &ExecContext,
        conn: &mut dyn DriverConnection,
        request: &StatementRequest,
        sink: &mut dyn RowSink,
    ) -> GatewayResult<u64> {
        self.authorize(ctx, request, false)?;
        let params = self.resolve_parameters(ctx, request)?;
        conn.execute_query(&request.sql, &params, sink)
            .map_err(|e| self.fail(ctx, conn, request, e))
    }

    /// Raw execute: update count or result set, decided after the call.
    pub fn execute_raw(
        &self,
        ctx: &ExecContext,
        conn: &mut dyn DriverConnection,
        request: &StatementRequest,
        sink: &mut dyn RowSink,
    ) -> GatewayResult<RawOutcome> {
        self.authorize(ctx, request, true)?;
        let params = self.resolve_parameters(ctx, request)?;
        match conn.execute(&request.sql, &params, sink) {
            Ok(outcome) => {
                if matches!(outcome, ExecuteOutcome::UpdateCount(_)) {
                    self.notify(ctx, request);
                }
                Ok(outcome.into())
            }
            Err(e) => Err(self.fail(ctx, conn, request, e)),
        }
    }

    /// Batch execution: every statement text passes the firewall chain
    /// before the driver sees any of them.
    pub fn execute_batch(
        &self,
        ctx: &ExecContext,
        conn: &mut dyn DriverConnection,
        request: &StatementRequest,
    ) -> GatewayResult<Vec<u64>> {
        let statements = request
            .batch
            .as_deref()
            .ok_or_else(|| GatewayError::Parameter("missing batch statement list".to_string()))?;
        for sql in statements {
            let single = StatementRequest {
                sql: sql.clone(),
                prepared: request.prepared,
                parameters: Vec::new(),
                batch: None,
            };
            self.authorize(ctx, &single, false)?;
        }
        match conn.execute_batch(statements) {
            Ok(counts) => {
                for sql in statements {
                    let single = StatementRequest {
                        sql: sql.clone(),
                        prepared: request.prepared,
                        parameters: Vec::new(),
                        batch: None,
                    };
                    self.notify(ctx, &single);
                }
                Ok(counts)
            }
            Err(e) => Err(self.fail(ctx, conn, request, e)),
        }
    }

    /// Failure path: roll back first, log with the per-database target, then
    /// surface the classified error.
    fn fail(
        &self,
        ctx: &ExecContext,
        conn: &mut dyn DriverConnection,
        request: &StatementRequest,
        cause: DriverError,
    ) -> GatewayError {
        if let Err(rollback_error) = conn.rollback() {
            error!(
                target: "sqlgate::pipeline",
                "rollback after failed statement also failed: {rollback_error}"
            );
        }
        error!(
            target: ctx.log_target.as_str(),
            "statement failed for user={}: {} (sql: {}, params: [{}])",
            ctx.username,
            cause,
            request.sql,
            request.parameter_snapshot()
        );
        cause.into()
    }

    /// Invoke change listeners for a successful modifying statement.
    fn notify(&self, ctx: &ExecContext, request: &StatementRequest) {
        if classify(&request.sql) != StatementKind::Modifying {
            return;
        }
        let mut event = None;
        for listener in &self.listeners {
            if listener.is_noop() {
                continue;
            }
            let event = event.get_or_insert_with(|| UpdateEvent {
                username: ctx.username.as_str().to_string(),
                database: ctx.database.clone(),
                client_ip: ctx.client_ip.clone(),
                sql: request.sql.clone(),
                prepared: request.prepared,
                parameter_snapshot: request.parameter_snapshot(),
            });
            listener.on_update(event);
        }
    }
}

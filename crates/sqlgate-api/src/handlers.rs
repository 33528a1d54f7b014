//! Request dispatch.
//!
//! A single catch-all handler receives every gateway request: the path
//! router decides the action, the session provider authenticates it, and the
//! work itself runs on the bounded worker pool. Statement results stream to
//! the response body through a bounded channel; the first channel message
//! decides between a `200` streaming response and a classified error, since
//! the status line cannot change once rows are flowing.

use crate::models::{error_response, ok_body, ok_response};
use crate::router::{parse_path, MetadataOp, ParsedRequest, SessionAction, SessionRequest};
use crate::stream::{BodyStream, ChannelWriter, StreamItem};
use actix_multipart::Multipart;
use actix_web::web::Bytes;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use log::{info, warn};
use serde_json::json;
use sqlgate_commons::{ConnectionId, GatewayError, GatewayResult, SessionId, UserId};
use sqlgate_core::{
    AppContext, ConnectionEntry, EncodeSettings, ExecContext, QueryEncoder, RawOutcome,
};
use sqlgate_driver::{DatabaseConfigurator, DriverConnection};
use sqlgate_filestore::delete_stale_files;
use sqlgate_wire::{SqlParameter, StatementRequest};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;
const DOWNLOAD_CHANNEL_DEPTH: usize = 8;

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(1);

/// The catch-all entry point for every gateway request.
pub async fn dispatch(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<Arc<AppContext>>,
) -> HttpResponse {
    let ctx = data.get_ref().clone();
    let path = req.path().to_string();
    match route(&req, payload, &ctx).await {
        Ok(response) => response,
        Err(error) => {
            // The outermost boundary: internal failures are logged privately
            // in full; the client sees only the classified envelope.
            if let GatewayError::Internal(detail) = &error {
                ctx.private_log.record(&path, detail);
            }
            error_response(&error, ctx.settings.include_stack_traces)
        }
    }
}

async fn route(
    req: &HttpRequest,
    payload: web::Payload,
    ctx: &Arc<AppContext>,
) -> GatewayResult<HttpResponse> {
    match parse_path(req.path())? {
        ParsedRequest::Version => Ok(ok_response(json!({
            "version": format!("sqlgate v{}", env!("CARGO_PKG_VERSION")),
        }))),
        ParsedRequest::Login { database, username } => {
            let form = read_form(req, payload).await?;
            login(req, ctx, &database, &username, &form).await
        }
        ParsedRequest::Session(session_request) => {
            session(req, payload, ctx, session_request).await
        }
    }
}

async fn login(
    req: &HttpRequest,
    ctx: &Arc<AppContext>,
    database: &str,
    username: &str,
    form: &HashMap<String, String>,
) -> GatewayResult<HttpResponse> {
    let user = UserId::try_new(username).map_err(GatewayError::Parameter)?;
    let password = form
        .get("password")
        .ok_or_else(|| GatewayError::Unauthorized("missing password".to_string()))?;
    // Fails before authentication if the database is not served at all.
    let configurator = ctx.configurator(database)?;
    let client_ip = peer_ip(req);
    if !ctx
        .authenticator
        .authenticate(&user, password, database, client_ip.as_deref())
    {
        warn!(
            target: "sqlgate::auth",
            "login refused for user={username} db={database} ip={}",
            client_ip.as_deref().unwrap_or("-")
        );
        return Err(GatewayError::Unauthorized(
            "invalid username or password".to_string(),
        ));
    }
    let session_id = ctx.sessions.generate(&user, database);
    info!(
        target: "sqlgate::auth",
        "login user={username} db={database} session={session_id} stateless={}",
        ctx.settings.stateless
    );
    if ctx.settings.stateless {
        return Ok(ok_response(json!({
            "session_id": session_id.as_str(),
            "connection_id": serde_json::Value::Null,
        })));
    }
    let connection_id = open_connection(ctx, configurator, &user, &session_id, database).await?;
    Ok(ok_response(json!({
        "session_id": session_id.as_str(),
        "connection_id": connection_id.as_str(),
    })))
}

/// Open a native connection on a worker and register it in the store.
async fn open_connection(
    ctx: &Arc<AppContext>,
    configurator: Arc<dyn DatabaseConfigurator>,
    user: &UserId,
    session_id: &SessionId,
    database: &str,
) -> GatewayResult<ConnectionId> {
    let store = ctx.store.clone();
    let user = user.clone();
    let session_id = session_id.clone();
    let database = database.to_string();
    ctx.workers
        .run(move || {
            let conn = configurator.connection()?;
            Ok(store.put(ConnectionEntry::new(user, session_id, database, conn)))
        })
        .await
}

async fn session(
    req: &HttpRequest,
    payload: web::Payload,
    ctx: &Arc<AppContext>,
    session_request: SessionRequest,
) -> GatewayResult<HttpResponse> {
    let session_id = SessionId::new(session_request.session_id.clone());
    let info = ctx
        .sessions
        .resolve(&session_id)
        .ok_or_else(|| GatewayError::Unauthorized("invalid or expired session".to_string()))?;
    let user = info.username.clone();
    let exec = ctx.exec_context(&user, &info.database, peer_ip(req))?;

    if ctx.settings.stateless && session_request.action.requires_stateful() {
        return Err(GatewayError::Denied(
            "action not allowed on a stateless session".to_string(),
        ));
    }

    match session_request.action.clone() {
        SessionAction::Logout => logout(ctx, &user, &session_id, &exec).await,
        SessionAction::Close => close(ctx, &user, &session_id, &session_request).await,
        SessionAction::GetConnection => {
            let configurator = ctx.configurator(&info.database)?;
            let connection_id =
                open_connection(ctx, configurator, &user, &session_id, &info.database).await?;
            Ok(ok_response(json!({"connection_id": connection_id.as_str()})))
        }
        SessionAction::Commit => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, |conn| {
                conn.commit().map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({})))
        }
        SessionAction::Rollback => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, |conn| {
                conn.rollback().map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({})))
        }
        SessionAction::SetAutoCommit(on) => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.set_auto_commit(on).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"auto_commit": on})))
        }
        SessionAction::SetReadOnly(on) => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.set_read_only(on).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"read_only": on})))
        }
        SessionAction::SetHoldability(value) => {
            let reported = value.clone();
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.set_holdability(&value).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"holdability": reported})))
        }
        SessionAction::SetTransactionIsolation(level) => {
            let reported = level.clone();
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.set_transaction_isolation(&level).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"transaction_isolation": reported})))
        }
        SessionAction::SavepointSet(name) => {
            let name = name.unwrap_or_else(|| {
                format!("svpt_{}", SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed))
            });
            let set_name = name.clone();
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.savepoint_set(&set_name).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"name": name})))
        }
        SessionAction::SavepointRollback(name) => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.savepoint_rollback(&name).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({})))
        }
        SessionAction::SavepointRelease(name) => {
            driver_call(ctx, &user, &session_id, &session_request, &exec, move |conn| {
                conn.savepoint_release(&name).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({})))
        }
        SessionAction::ExecuteUpdate => {
            let form = read_form(req, payload).await?;
            let request = statement_request(&form)?;
            let checkout = checkout(ctx, &user, &session_id, &session_request, &exec)?;
            let pipeline = ctx.pipeline.clone();
            let exec_ctx = exec.clone();
            let count = ctx
                .workers
                .run(move || {
                    checkout.run(|conn| pipeline.execute_update(&exec_ctx, conn, &request))
                })
                .await?;
            Ok(ok_response(json!({"row_count": count})))
        }
        SessionAction::ExecuteBatch => {
            let form = read_form(req, payload).await?;
            let request = batch_request(&form)?;
            let checkout = checkout(ctx, &user, &session_id, &session_request, &exec)?;
            let pipeline = ctx.pipeline.clone();
            let exec_ctx = exec.clone();
            let counts = ctx
                .workers
                .run(move || {
                    checkout.run(|conn| pipeline.execute_batch(&exec_ctx, conn, &request))
                })
                .await?;
            let total: u64 = counts.iter().sum();
            Ok(ok_response(
                json!({"update_counts": counts, "row_count": total}),
            ))
        }
        SessionAction::ExecuteQuery => {
            let form = read_form(req, payload).await?;
            let request = statement_request(&form)?;
            let checkout = checkout(ctx, &user, &session_id, &session_request, &exec)?;
            stream_statement(ctx, exec, checkout, request, &form, false).await
        }
        SessionAction::Execute => {
            let form = read_form(req, payload).await?;
            let request = statement_request(&form)?;
            let checkout = checkout(ctx, &user, &session_id, &session_request, &exec)?;
            stream_statement(ctx, exec, checkout, request, &form, true).await
        }
        SessionAction::MetadataQuery(op) => {
            let form = read_form(req, payload).await?;
            metadata_query(ctx, &user, &session_id, &session_request, &exec, op, &form).await
        }
        SessionAction::GetBlobLength(blob_id) => {
            let blob_dir = exec.blob_dir.clone();
            let length = ctx
                .workers
                .run(move || Ok(blob_dir.length(&blob_id)?))
                .await?;
            Ok(ok_response(json!({"length": length})))
        }
        SessionAction::BlobUpload => blob_upload(req, payload, &exec).await,
        SessionAction::BlobDownload(blob_id) => blob_download(ctx, &exec, blob_id).await,
    }
}

async fn logout(
    ctx: &Arc<AppContext>,
    user: &UserId,
    session_id: &SessionId,
    exec: &ExecContext,
) -> GatewayResult<HttpResponse> {
    let removed = ctx.store.remove_session(user, session_id);
    ctx.sessions.invalidate(session_id);
    let closed = removed.len();
    let spool_dir = exec.blob_dir.path().to_path_buf();
    let stale_age = ctx.settings.session_idle;
    ctx.workers
        .run(move || {
            for entry in removed {
                let mut entry = entry.lock();
                if let Err(e) = entry.conn.rollback() {
                    warn!(
                        target: "sqlgate::session",
                        "rollback at logout failed for connection {}: {e}",
                        entry.connection_id
                    );
                }
            }
            delete_stale_files(&spool_dir, stale_age);
            Ok(())
        })
        .await?;
    info!(
        target: "sqlgate::session",
        "logout user={user} session={session_id}: closed {closed} connections"
    );
    Ok(ok_response(json!({})))
}

async fn close(
    ctx: &Arc<AppContext>,
    user: &UserId,
    session_id: &SessionId,
    session_request: &SessionRequest,
) -> GatewayResult<HttpResponse> {
    let entry = match &session_request.connection_id {
        Some(cid) => ctx
            .store
            .remove(user, session_id, &ConnectionId::new(cid.clone())),
        None => ctx.store.get(user, session_id, None).and_then(|entry| {
            let cid = entry.lock().connection_id.clone();
            ctx.store.remove(user, session_id, &cid)
        }),
    }
    .ok_or_else(|| GatewayError::NotFound("connection invalidated".to_string()))?;
    ctx.workers
        .run(move || {
            let mut entry = entry.lock();
            if let Err(e) = entry.conn.rollback() {
                warn!(
                    target: "sqlgate::session",
                    "rollback at close failed for connection {}: {e}",
                    entry.connection_id
                );
            }
            Ok(())
        })
        .await?;
    Ok(ok_response(json!({})))
}

/// A checked-out connection for the duration of one worker call. Stored
/// entries stay in the store; fresh ones are dropped when the call ends,
/// success or failure.
enum Checkout {
    Stored(Arc<parking_lot::Mutex<ConnectionEntry>>),
    Fresh(Arc<dyn DatabaseConfigurator>),
}

impl Checkout {
    fn run<T>(
        self,
        f: impl FnOnce(&mut dyn DriverConnection) -> GatewayResult<T>,
    ) -> GatewayResult<T> {
        match self {
            Checkout::Stored(entry) => {
                let mut entry = entry.lock();
                entry.touch();
                f(entry.conn.as_mut())
            }
            Checkout::Fresh(configurator) => {
                let mut conn = configurator.connection()?;
                conn.set_auto_commit(true)?;
                f(conn.as_mut())
            }
        }
    }
}

fn checkout(
    ctx: &Arc<AppContext>,
    user: &UserId,
    session_id: &SessionId,
    session_request: &SessionRequest,
    exec: &ExecContext,
) -> GatewayResult<Checkout> {
    if ctx.settings.stateless {
        return Ok(Checkout::Fresh(ctx.configurator(&exec.database)?));
    }
    let connection_id = session_request
        .connection_id
        .as_ref()
        .map(|cid| ConnectionId::new(cid.clone()));
    ctx.store
        .get(user, session_id, connection_id.as_ref())
        .map(Checkout::Stored)
        .ok_or_else(|| GatewayError::NotFound("connection invalidated".to_string()))
}

/// Run one driver call against the session's stored connection.
async fn driver_call<T, F>(
    ctx: &Arc<AppContext>,
    user: &UserId,
    session_id: &SessionId,
    session_request: &SessionRequest,
    exec: &ExecContext,
    f: F,
) -> GatewayResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn DriverConnection) -> GatewayResult<T> + Send + 'static,
{
    let checkout = checkout(ctx, user, session_id, session_request, exec)?;
    ctx.workers.run(move || checkout.run(f)).await
}

async fn metadata_query(
    ctx: &Arc<AppContext>,
    user: &UserId,
    session_id: &SessionId,
    session_request: &SessionRequest,
    exec: &ExecContext,
    op: MetadataOp,
    form: &HashMap<String, String>,
) -> GatewayResult<HttpResponse> {
    ctx.pipeline.authorize_metadata(exec)?;
    match op {
        MetadataOp::TableNames(filter) => {
            let filter = filter.or_else(|| form.get("filter").cloned());
            let names = driver_call(ctx, user, session_id, session_request, exec, move |conn| {
                conn.table_names(filter.as_deref()).map_err(Into::into)
            })
            .await?;
            Ok(ok_response(json!({"table_names": names})))
        }
        MetadataOp::Table(table) => {
            let columns = driver_call(ctx, user, session_id, session_request, exec, move |conn| {
                conn.table_columns(&table).map_err(Into::into)
            })
            .await?;
            let rendered: Vec<serde_json::Value> = columns
                .iter()
                .map(|c| {
                    json!({
                        "column_name": c.name,
                        "type_code": c.type_code,
                        "type_name": c.type_name,
                        "table": c.table,
                    })
                })
                .collect();
            Ok(ok_response(json!({"columns": rendered})))
        }
    }
}

/// Execute a query (or a raw execute) and stream the result envelope.
///
/// The worker sends either body chunks or one classified error through the
/// channel. Waiting for the first message is bounded by the pool's time
/// ceiling, so a stuck driver surfaces as a timeout rather than a hang.
async fn stream_statement(
    ctx: &Arc<AppContext>,
    exec: ExecContext,
    checkout: Checkout,
    request: StatementRequest,
    form: &HashMap<String, String>,
    raw_execute: bool,
) -> GatewayResult<HttpResponse> {
    let settings = EncodeSettings {
        include_column_types: form.get("column_types").map(String::as_str) == Some("true"),
        html_unescape_clobs: exec.html_unescape_clobs,
    };
    let permit = ctx.workers.admit()?;
    let (tx, mut rx) = mpsc::channel::<StreamItem>(DOWNLOAD_CHANNEL_DEPTH);
    let pipeline = ctx.pipeline.clone();
    let blob_dir = exec.blob_dir.clone();

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut encoder = QueryEncoder::new(ChannelWriter::new(tx.clone()), blob_dir, settings);
        let outcome: GatewayResult<()> = (|| {
            match checkout {
                Checkout::Stored(entry) => {
                    let mut entry = entry.lock();
                    entry.touch();
                    let rowids = if raw_execute {
                        match pipeline.execute_raw(&exec, entry.conn.as_mut(), &request, &mut encoder)? {
                            RawOutcome::UpdateCount(count) => {
                                send_update_count(&tx, count)?;
                                return Ok(());
                            }
                            RawOutcome::ResultSet(_) => finish(encoder)?,
                        }
                    } else {
                        pipeline.execute_query(&exec, entry.conn.as_mut(), &request, &mut encoder)?;
                        finish(encoder)?
                    };
                    entry.rowid_registry.extend(rowids);
                    Ok(())
                }
                Checkout::Fresh(configurator) => {
                    let mut conn = configurator.connection()?;
                    conn.set_auto_commit(true)?;
                    if raw_execute {
                        match pipeline.execute_raw(&exec, conn.as_mut(), &request, &mut encoder)? {
                            RawOutcome::UpdateCount(count) => send_update_count(&tx, count)?,
                            RawOutcome::ResultSet(_) => {
                                finish(encoder)?;
                            }
                        }
                    } else {
                        pipeline.execute_query(&exec, conn.as_mut(), &request, &mut encoder)?;
                        finish(encoder)?;
                    }
                    Ok(())
                }
            }
        })();
        if let Err(error) = outcome {
            let _ = tx.blocking_send(Err(error));
        }
    });

    match tokio::time::timeout(ctx.workers.max_wait(), rx.recv()).await {
        Err(_) => Err(GatewayError::Timeout(
            "no result before the execution ceiling".to_string(),
        )),
        Ok(None) => Err(GatewayError::Internal(
            "statement worker produced no output".to_string(),
        )),
        Ok(Some(Err(error))) => Err(error),
        Ok(Some(Ok(first))) => Ok(HttpResponse::Ok()
            .content_type("application/json")
            .streaming(BodyStream::new(first, rx))),
    }
}

fn finish(
    encoder: QueryEncoder<ChannelWriter>,
) -> GatewayResult<HashMap<String, i64>> {
    let (_, _, rowids) = encoder
        .finish()
        .map_err(|e| GatewayError::Internal(format!("result stream aborted: {e}")))?;
    Ok(rowids)
}

fn send_update_count(tx: &mpsc::Sender<StreamItem>, count: u64) -> GatewayResult<()> {
    tx.blocking_send(Ok(Bytes::from(ok_body(json!({"row_count": count})))))
        .map_err(|_| GatewayError::Internal("response receiver dropped".to_string()))
}

async fn blob_upload(
    req: &HttpRequest,
    payload: web::Payload,
    exec: &ExecContext,
) -> GatewayResult<HttpResponse> {
    let mut multipart = Multipart::new(req.headers(), payload);
    let mut blob_id: Option<String> = None;
    while let Some(mut field) = multipart.try_next().await.map_err(bad_multipart)? {
        match field.name() {
            "blob_id" => {
                let mut raw = Vec::new();
                while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
                    raw.extend_from_slice(&chunk);
                }
                let id = String::from_utf8(raw)
                    .map_err(|_| GatewayError::Parameter("blob_id is not UTF-8".to_string()))?;
                blob_id = Some(id);
            }
            "file" => {
                let id = blob_id.clone().ok_or_else(|| {
                    GatewayError::Parameter("blob_id part must precede the file part".to_string())
                })?;
                let blob_dir = exec.blob_dir.clone();
                let mut writer =
                    web::block(move || blob_dir.create(&id)).await.map_err(blocking_failed)??;
                while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
                    writer = web::block(move || {
                        writer.write_all(&chunk)?;
                        Ok::<_, std::io::Error>(writer)
                    })
                    .await
                    .map_err(blocking_failed)?
                    .map_err(|e| GatewayError::Internal(format!("blob write failed: {e}")))?;
                }
                web::block(move || writer.flush())
                    .await
                    .map_err(blocking_failed)?
                    .map_err(|e| GatewayError::Internal(format!("blob write failed: {e}")))?;
            }
            _ => {}
        }
    }
    match blob_id {
        Some(_) => Ok(ok_response(json!({}))),
        None => Err(GatewayError::Parameter(
            "missing blob_id part in upload".to_string(),
        )),
    }
}

async fn blob_download(
    ctx: &Arc<AppContext>,
    exec: &ExecContext,
    blob_id: String,
) -> GatewayResult<HttpResponse> {
    let blob_dir = exec.blob_dir.clone();
    let probe_id = blob_id.clone();
    // NotFound surfaces here, before the status line is committed.
    let is_null = ctx
        .workers
        .run(move || {
            if blob_dir.is_null(&probe_id)? {
                return Ok(true);
            }
            blob_dir.length(&probe_id)?;
            Ok(false)
        })
        .await?;
    if is_null {
        return Ok(HttpResponse::Ok()
            .content_type("application/octet-stream")
            .insert_header(("X-Blob-Null", "true"))
            .body(""));
    }
    let permit = ctx.workers.admit()?;
    let (tx, rx) = mpsc::channel::<StreamItem>(DOWNLOAD_CHANNEL_DEPTH);
    let blob_dir = exec.blob_dir.clone();
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let outcome: GatewayResult<()> = (|| {
            let mut reader = blob_dir.open(&blob_id)?;
            let mut writer = ChannelWriter::new(tx.clone());
            std::io::copy(&mut reader, &mut writer)
                .and_then(|_| writer.flush())
                .map_err(|e| GatewayError::Internal(format!("blob read failed: {e}")))?;
            Ok(())
        })();
        if let Err(error) = outcome {
            let _ = tx.blocking_send(Err(error));
        }
    });
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .streaming(BodyStream::new(Bytes::new(), rx)))
}

fn bad_multipart(e: actix_multipart::MultipartError) -> GatewayError {
    GatewayError::Parameter(format!("bad multipart body: {e}"))
}

fn blocking_failed(e: actix_web::error::BlockingError) -> GatewayError {
    GatewayError::Internal(format!("blocking file operation aborted: {e}"))
}

/// Collect the urlencoded body and query string into one field map.
async fn read_form(
    req: &HttpRequest,
    mut payload: web::Payload,
) -> GatewayResult<HashMap<String, String>> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk =
            chunk.map_err(|e| GatewayError::Parse(format!("failed to read body: {e}")))?;
        if body.len() + chunk.len() > MAX_FORM_BYTES {
            return Err(GatewayError::Parameter("request body too large".to_string()));
        }
        body.extend_from_slice(&chunk);
    }
    let mut form: HashMap<String, String> = HashMap::new();
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
        .map_err(|e| GatewayError::Parse(format!("bad form body: {e}")))?;
    form.extend(pairs);
    let query_pairs: Vec<(String, String)> = serde_urlencoded::from_str(req.query_string())
        .map_err(|e| GatewayError::Parse(format!("bad query string: {e}")))?;
    for (key, value) in query_pairs {
        form.entry(key).or_insert(value);
    }
    Ok(form)
}

fn statement_request(form: &HashMap<String, String>) -> GatewayResult<StatementRequest> {
    let sql = form
        .get("sql")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| GatewayError::Parameter("missing sql field".to_string()))?;
    Ok(StatementRequest {
        sql: sql.clone(),
        prepared: form.get("prepared_statement").map(String::as_str) == Some("true"),
        parameters: SqlParameter::from_form(form)?,
        batch: None,
    })
}

fn batch_request(form: &HashMap<String, String>) -> GatewayResult<StatementRequest> {
    let raw = form
        .get("batch_list")
        .ok_or_else(|| GatewayError::Parameter("missing batch_list field".to_string()))?;
    let statements: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| GatewayError::Parameter(format!("batch_list is not a JSON array: {e}")))?;
    if statements.is_empty() {
        return Err(GatewayError::Parameter("empty batch_list".to_string()));
    }
    Ok(StatementRequest {
        sql: String::new(),
        prepared: false,
        parameters: Vec::new(),
        batch: Some(statements),
    })
}

fn peer_ip(req: &HttpRequest) -> Option<String> {
    req.peer_addr().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::configure_routes;
    use actix_web::body::MessageBody;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::{test, App};
    use serde_json::Value;
    use sqlgate_auth::{build_firewalls, PermissiveAuthenticator, UuidSessionProvider};
    use sqlgate_core::{GatewaySettings, PrivateLog, StatementPipeline, WorkerPool};
    use sqlgate_driver::SqliteConfigurator;
    use std::time::Duration;

    fn app_context(
        dir: &tempfile::TempDir,
        stateless: bool,
        firewalls: &[&str],
    ) -> Arc<AppContext> {
        let configurator = SqliteConfigurator::new(
            "testdb",
            dir.path().join("test.db"),
            dir.path().join("blobs"),
        );
        let names: Vec<String> = firewalls.iter().map(|s| s.to_string()).collect();
        let pipeline = StatementPipeline::new(build_firewalls(&names).unwrap(), Vec::new());
        Arc::new(AppContext::new(
            vec![Arc::new(configurator)],
            Arc::new(UuidSessionProvider::new()),
            Arc::new(PermissiveAuthenticator),
            pipeline,
            WorkerPool::new(4, 4, Duration::from_secs(10)),
            PrivateLog::open(dir.path().join("private.log"), 1 << 20).unwrap(),
            GatewaySettings {
                stateless,
                ..Default::default()
            },
        ))
    }

    async fn gateway(
        ctx: Arc<AppContext>,
    ) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
    {
        test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes),
        )
        .await
    }

    async fn post_form<S, B>(app: &S, uri: &str, fields: &[(&str, &str)]) -> (u16, Value)
    where
        S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody,
    {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_form(fields)
            .to_request();
        let resp = test::call_service(app, req).await;
        let status = resp.status().as_u16();
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        (status, serde_json::from_str(text.trim_end()).unwrap())
    }

    async fn login<S, B>(app: &S) -> String
    where
        S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody,
    {
        let (status, body) = post_form(
            app,
            "/gate/database/testdb/username/joe/login",
            &[("password", "secret")],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "OK");
        body["session_id"].as_str().unwrap().to_string()
    }

    #[actix_rt::test]
    async fn test_get_version() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let (status, body) = post_form(&app, "/gate/get_version", &[]).await;
        assert_eq!(status, 200);
        assert!(body["version"].as_str().unwrap().starts_with("sqlgate v"));
    }

    #[actix_rt::test]
    async fn test_unknown_action_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let (status, body) = post_form(&app, "/gate/session/s1/transmogrify", &[]).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "FAIL");
        assert_eq!(body["error_type"], 1);
    }

    #[actix_rt::test]
    async fn test_invalid_session_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let (status, body) =
            post_form(&app, "/gate/session/bogus/execute_update", &[("sql", "SELECT 1")]).await;
        assert_eq!(status, 401);
        assert_eq!(body["error_type"], 3);
    }

    #[actix_rt::test]
    async fn test_login_update_and_query_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = app_context(&dir, false, &[]);
        let app = gateway(ctx.clone()).await;
        let sid = login(&app).await;

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "CREATE TABLE customers (id INTEGER, name VARCHAR(64))")],
        )
        .await;
        assert_eq!(status, 200, "create failed: {body}");

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[
                ("sql", "INSERT INTO customers VALUES (?, ?)"),
                ("prepared_statement", "true"),
                ("param_type_1", "INTEGER"),
                ("param_value_1", "1"),
                ("param_type_2", "VARCHAR"),
                ("param_value_2", "ada"),
            ],
        )
        .await;
        assert_eq!(status, 200, "insert failed: {body}");
        assert_eq!(body["row_count"], 1);

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_query"),
            &[
                ("sql", "SELECT id, name FROM customers"),
                ("column_types", "true"),
            ],
        )
        .await;
        assert_eq!(status, 200, "query failed: {body}");
        assert_eq!(body["row_count"], 1);
        assert_eq!(body["query_rows"][0]["id"], 1);
        assert_eq!(body["query_rows"][0]["name"], "ada");
        assert!(body["column_types"].is_array());

        // Exactly one stored connection until logout.
        assert_eq!(ctx.store.len(), 1);
        let (status, _) = post_form(&app, &format!("/gate/session/{sid}/logout"), &[]).await;
        assert_eq!(status, 200);
        assert_eq!(ctx.store.len(), 0);
    }

    #[actix_rt::test]
    async fn test_raw_execute_reports_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute"),
            &[("sql", "CREATE TABLE t (a INTEGER)")],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["row_count"], 0);
        assert!(body.get("query_rows").is_none());

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute"),
            &[("sql", "SELECT 1 AS one")],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["query_rows"][0]["one"], 1);
    }

    #[actix_rt::test]
    async fn test_firewall_denial_is_forbidden_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = app_context(&dir, false, &["read_only"]);
        let app = gateway(ctx).await;
        let sid = login(&app).await;

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "DELETE FROM sqlite_master")],
        )
        .await;
        assert_eq!(status, 403);
        assert_eq!(body["error_type"], 4);
        assert!(body["error_message"]
            .as_str()
            .unwrap()
            .contains("not allowed"));
    }

    #[actix_rt::test]
    async fn test_stateless_mode_refuses_transaction_control() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = app_context(&dir, true, &[]);
        let app = gateway(ctx.clone()).await;
        let sid = login(&app).await;

        // No handle was stored at login.
        assert!(ctx.store.is_empty());

        let (status, body) =
            post_form(&app, &format!("/gate/session/{sid}/commit"), &[]).await;
        assert_eq!(status, 403);
        assert!(body["error_message"].as_str().unwrap().contains("stateless"));

        // Plain execution still works, with a per-request connection.
        let (status, _) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "CREATE TABLE t (a INTEGER)")],
        )
        .await;
        assert_eq!(status, 200);
        assert!(ctx.store.is_empty());
    }

    #[actix_rt::test]
    async fn test_transaction_commit_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "CREATE TABLE t (a INTEGER)")],
        )
        .await;
        let (status, _) =
            post_form(&app, &format!("/gate/session/{sid}/set_auto_commit/false"), &[]).await;
        assert_eq!(status, 200);

        post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "INSERT INTO t VALUES (1)")],
        )
        .await;
        let (status, _) = post_form(&app, &format!("/gate/session/{sid}/rollback"), &[]).await;
        assert_eq!(status, 200);

        let (_, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_query"),
            &[("sql", "SELECT COUNT(*) AS n FROM t")],
        )
        .await;
        assert_eq!(body["query_rows"][0]["n"], 0);
    }

    #[actix_rt::test]
    async fn test_savepoint_name_generated_when_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        post_form(&app, &format!("/gate/session/{sid}/set_auto_commit/false"), &[]).await;
        let (status, body) =
            post_form(&app, &format!("/gate/session/{sid}/set_savepoint"), &[]).await;
        assert_eq!(status, 200);
        assert!(body["name"].as_str().unwrap().starts_with("svpt_"));
    }

    #[actix_rt::test]
    async fn test_metadata_query_table_names_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "CREATE TABLE customers (id INTEGER, name VARCHAR(64))")],
        )
        .await;
        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/metadata_query/table_names"),
            &[],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["table_names"], serde_json::json!(["customers"]));

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/metadata_query/table/customers"),
            &[],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["columns"][0]["column_name"], "id");

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/metadata_query/table/missing"),
            &[],
        )
        .await;
        assert_eq!(status, 404, "{body}");
    }

    #[actix_rt::test]
    async fn test_blob_upload_length_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        let blob_id = "0123456789abcdef0123456789abcdef.blob";
        let boundary = "sqlgatetestboundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"blob_id\"\r\n\r\n\
             {blob_id}\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"payload\"\r\n\r\n\
             hello blob\r\n\
             --{boundary}--\r\n"
        );
        let req = test::TestRequest::post()
            .uri(&format!("/gate/session/{sid}/blob_upload"))
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);

        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/get_blob_length/{blob_id}"),
            &[],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["length"], 10);

        let req = test::TestRequest::post()
            .uri(&format!("/gate/session/{sid}/blob_download/{blob_id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
        let downloaded = test::read_body(resp).await;
        assert_eq!(&downloaded[..], b"hello blob");
    }

    #[actix_rt::test]
    async fn test_get_blob_length_of_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;
        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/get_blob_length/{}.blob", "f".repeat(32)),
            &[],
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(body["error_type"], 6);
    }

    #[actix_rt::test]
    async fn test_execute_batch_returns_per_statement_counts() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let sid = login(&app).await;

        post_form(
            &app,
            &format!("/gate/session/{sid}/execute_update"),
            &[("sql", "CREATE TABLE t (a INTEGER)")],
        )
        .await;
        let (status, body) = post_form(
            &app,
            &format!("/gate/session/{sid}/execute_batch"),
            &[(
                "batch_list",
                r#"["INSERT INTO t VALUES (1)","INSERT INTO t VALUES (2)","UPDATE t SET a = 9"]"#,
            )],
        )
        .await;
        assert_eq!(status, 200, "{body}");
        assert_eq!(body["update_counts"], serde_json::json!([1, 1, 2]));
    }

    #[actix_rt::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = gateway(app_context(&dir, false, &[])).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
    }
}

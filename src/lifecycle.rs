//! Server lifecycle management helpers.
//!
//! This module encapsulates the heavy lifting previously handled directly
//! in `main.rs`: bootstrapping the shared gateway context from
//! configuration, wiring the HTTP server, and coordinating graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use log::{error, info, warn};

use sqlgate_auth::{build_authenticator, build_firewalls, UuidSessionProvider};
use sqlgate_core::{
    build_listeners, spawn_reaper, AppContext, GatewaySettings, PrivateLog, StatementPipeline,
    WorkerPool,
};
use sqlgate_driver::sqlite::SqliteConfigurator;
use sqlgate_driver::DatabaseConfigurator;

use crate::config::ServerConfig;

/// Build the shared application context from the loaded configuration.
pub fn bootstrap(config: &ServerConfig) -> Result<Arc<AppContext>> {
    let mut configurators: Vec<Arc<dyn DatabaseConfigurator>> = Vec::new();
    for (name, db) in &config.databases {
        info!("Serving database {:?} from {}", name, db.path);
        configurators.push(Arc::new(SqliteConfigurator::new(
            name.clone(),
            &db.path,
            &db.blob_dir,
        )));
    }

    let firewalls = build_firewalls(&config.firewall.chain)
        .map_err(|e| anyhow::anyhow!("firewall configuration: {e}"))?;
    for firewall in &firewalls {
        info!("SQL firewall enabled: {}", firewall.name());
    }
    let listeners = build_listeners(&config.listeners.chain)
        .map_err(|e| anyhow::anyhow!("listener configuration: {e}"))?;
    let authenticator = build_authenticator(&config.auth.authenticator, &config.auth.users)
        .map_err(|e| anyhow::anyhow!("auth configuration: {e}"))?;

    let pipeline = StatementPipeline::new(firewalls, listeners);
    let workers = WorkerPool::new(
        config.pool.max_concurrent,
        config.pool.queue_depth,
        Duration::from_secs(config.pool.max_wait_seconds),
    );
    let private_log = PrivateLog::open(
        &config.logging.private_log_path,
        config.logging.private_log_max_bytes,
    )?;

    let settings = GatewaySettings {
        stateless: config.gateway.stateless,
        include_stack_traces: config.gateway.include_stack_traces,
        html_escaped_clobs: config.gateway.html_escaped_clobs,
        session_idle: Duration::from_secs(config.gateway.session_idle_seconds),
        reaper_interval: Duration::from_secs(config.gateway.reaper_interval_seconds),
    };

    let context = Arc::new(AppContext::new(
        configurators,
        Arc::new(UuidSessionProvider::new()),
        authenticator,
        pipeline,
        workers,
        private_log,
        settings,
    ));

    Ok(context)
}

/// Run the HTTP server until SIGINT. Reapers run alongside the server and
/// stop with the process.
pub async fn run(config: &ServerConfig, context: Arc<AppContext>) -> Result<()> {
    let mut reapers = Vec::new();
    for database in context.databases() {
        let configurator = context.configurator(&database)?;
        reapers.push(spawn_reaper(
            context.store.clone(),
            configurator,
            context.settings.reaper_interval,
            context.settings.session_idle,
        ));
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let data = web::Data::new(context.clone());
    let keepalive = config.server.keepalive_timeout;

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);
        App::new()
            .wrap(cors)
            .app_data(data.clone())
            .configure(sqlgate_api::configure_routes)
    })
    .keep_alive(Duration::from_secs(keepalive))
    .bind(&bind_addr)?;

    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    info!("Listening on http://{bind_addr}");
    let server = server.run();
    let handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("Server stopped"),
                Ok(Err(e)) => error!("Server error: {e}"),
                Err(e) => error!("Server task failed: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, draining connections");
            handle.stop(true).await;
        }
    }

    for reaper in reapers {
        reaper.abort();
    }
    release_connections(&context);
    Ok(())
}

/// Roll back and drop every stateful connection still in the store, so no
/// half-open transaction survives the process.
fn release_connections(context: &AppContext) {
    let drained = context.store.drain();
    if drained.is_empty() {
        return;
    }
    info!("Releasing {} stateful connections", drained.len());
    for entry in drained {
        let mut entry = entry.lock();
        if let Err(e) = entry.conn.rollback() {
            warn!(
                "rollback while releasing connection {} failed: {e}",
                entry.connection_id
            );
        }
    }
}

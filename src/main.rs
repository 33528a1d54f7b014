// sqlgate server entrypoint
//!
//! The heavy lifting (configuration, bootstrap, graceful shutdown) lives in
//! dedicated modules so this file remains a thin orchestrator.

use sqlgate_server::config::ServerConfig;
use sqlgate_server::{lifecycle, logging};

use anyhow::Result;
use log::info;
use std::env;

#[actix_web::main]
async fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "server.toml".to_string());

    let config = match ServerConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load {config_path}: {e}");
            eprintln!("The server cannot start without valid configuration");
            std::process::exit(1);
        }
    };

    // Logging before any other side effects
    logging::init_logging(&config.logging)?;

    info!("sqlgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Host: {}  Port: {}", config.server.host, config.server.port);
    if config.gateway.stateless {
        info!("Stateless mode: connections are opened and closed per request");
    }

    let context = lifecycle::bootstrap(&config)?;
    lifecycle::run(&config, context).await
}

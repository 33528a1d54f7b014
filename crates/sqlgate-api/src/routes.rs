//! HTTP route configuration.
//!
//! The gateway has exactly one real route: a catch-all that hands the path
//! to the router. Declared actix routes would duplicate the path grammar,
//! so only the health probe gets its own route.

use crate::handlers;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_handler))
        .default_service(web::route().to(handlers::dispatch));
}

async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

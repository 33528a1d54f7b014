//! Shared helpers for gateway integration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App};
use serde_json::Value;

use sqlgate_core::AppContext;
use sqlgate_server::config::{DatabaseSettings, LoggingSettings, ServerConfig, ServerSettings};
use sqlgate_server::lifecycle;

/// Configuration serving a single SQLite database out of `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    let mut databases = HashMap::new();
    databases.insert(
        "testdb".to_string(),
        DatabaseSettings {
            path: dir.join("testdb.sqlite").to_string_lossy().into_owned(),
            blob_dir: dir.join("blobs").to_string_lossy().into_owned(),
        },
    );
    ServerConfig {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 1,
            keepalive_timeout: 75,
        },
        gateway: Default::default(),
        databases,
        pool: Default::default(),
        firewall: Default::default(),
        listeners: Default::default(),
        auth: Default::default(),
        logging: LoggingSettings {
            private_log_path: dir.join("private_error.log").to_string_lossy().into_owned(),
            log_to_console: false,
            ..Default::default()
        },
    }
}

pub fn build_context(config: &ServerConfig) -> Arc<AppContext> {
    lifecycle::bootstrap(config).expect("bootstrap failed")
}

pub async fn spawn_app(
    context: Arc<AppContext>,
) -> impl Service<
    actix_http::Request,
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(context))
            .configure(sqlgate_api::configure_routes),
    )
    .await
}

/// POST a form to the gateway and return (HTTP status, parsed body).
pub async fn post_form<S, B>(app: &S, path: &str, form: &[(&str, &str)]) -> (u16, Value)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri(path)
        .set_form(form)
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let bytes = test::read_body(resp).await;
    let body: Value = serde_json::from_slice(&bytes).expect("body is not JSON");
    (status, body)
}

/// Log in and return the session id.
pub async fn login<S, B>(app: &S, username: &str, password: &str) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let path = format!("/database/testdb/username/{username}/login");
    let (status, body) = post_form(app, &path, &[("password", password)]).await;
    assert_eq!(status, 200, "login failed: {body}");
    assert_eq!(body["status"], "OK");
    body["session_id"]
        .as_str()
        .expect("no session_id")
        .to_string()
}

//! Wire response envelopes.
//!
//! Every response body is a single newline-terminated JSON object. Success
//! opens with `"status":"OK"` plus the action's fields; failure carries the
//! stable `error_type` code, a message, and optionally the cause chain when
//! the server is configured to expose diagnostics.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::{json, Map, Value};
use sqlgate_commons::GatewayError;

/// Render the success envelope with the given extra fields.
pub fn ok_body(extra: Value) -> String {
    let mut object = Map::new();
    object.insert("status".to_string(), json!("OK"));
    if let Value::Object(fields) = extra {
        object.extend(fields);
    }
    let mut body = Value::Object(object).to_string();
    body.push('\n');
    body
}

/// Render the failure envelope for a classified error.
pub fn fail_body(error: &GatewayError, include_stack_trace: bool) -> String {
    let mut object = Map::new();
    object.insert("status".to_string(), json!("FAIL"));
    object.insert("error_type".to_string(), json!(error.error_type()));
    object.insert("error_message".to_string(), json!(error.to_string()));
    if include_stack_trace {
        if let Some(detail) = error.detail() {
            object.insert("stack_trace".to_string(), json!(detail));
        }
    }
    let mut body = Value::Object(object).to_string();
    body.push('\n');
    body
}

pub fn ok_response(extra: Value) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(ok_body(extra))
}

/// Map a classified error to its HTTP status and failure envelope.
pub fn error_response(error: &GatewayError, include_stack_trace: bool) -> HttpResponse {
    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status)
        .content_type("application/json")
        .body(fail_body(error, include_stack_trace))
}

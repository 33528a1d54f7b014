//! Change listeners, notified after successful modifying statements.

use log::info;
use serde_json::json;
use sqlgate_commons::{GatewayError, GatewayResult};
use std::sync::Arc;

/// Event describing one committed-equivalent modification.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub username: String,
    pub database: String,
    pub client_ip: Option<String>,
    pub sql: String,
    pub prepared: bool,
    pub parameter_snapshot: String,
}

pub trait UpdateListener: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called synchronously after a successful modifying statement.
    fn on_update(&self, event: &UpdateEvent);

    /// No-op listeners are skipped by the pipeline without building events.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Default listener; does nothing and is skipped for efficiency.
pub struct NoOpListener;

impl UpdateListener for NoOpListener {
    fn name(&self) -> &'static str {
        "no_op"
    }

    fn on_update(&self, _event: &UpdateEvent) {}

    fn is_noop(&self) -> bool {
        true
    }
}

/// Writes one structured JSON line per modification to the update log target.
pub struct LoggingUpdateListener;

impl UpdateListener for LoggingUpdateListener {
    fn name(&self) -> &'static str {
        "json_log"
    }

    fn on_update(&self, event: &UpdateEvent) {
        let line = json!({
            "username": event.username,
            "database": event.database,
            "ip": event.client_ip,
            "sql": event.sql,
            "prepared": event.prepared,
            "parameters": event.parameter_snapshot,
        });
        info!(target: "sqlgate::updates", "{line}");
    }
}

/// Resolve configured listener names, mirroring the firewall registry.
pub fn build_listeners(names: &[String]) -> GatewayResult<Vec<Arc<dyn UpdateListener>>> {
    if names.is_empty() {
        return Ok(vec![Arc::new(NoOpListener)]);
    }
    names
        .iter()
        .map(|name| -> GatewayResult<Arc<dyn UpdateListener>> {
            match name.as_str() {
                "no_op" => Ok(Arc::new(NoOpListener)),
                "json_log" => Ok(Arc::new(LoggingUpdateListener)),
                other => Err(GatewayError::Internal(format!(
                    "unknown update listener {other:?} in configuration"
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_noop() {
        let listeners = build_listeners(&[]).unwrap();
        assert_eq!(listeners.len(), 1);
        assert!(listeners[0].is_noop());
    }

    #[test]
    fn test_unknown_listener_fails() {
        assert!(build_listeners(&["kafka".to_string()]).is_err());
    }
}

//! Application context: the one object wiring the gateway's collaborators.
//!
//! Constructed once at startup from configuration and handed to every
//! request handler. There is no process-wide static state; single-instance
//! semantics come from constructing exactly one context.

use crate::pipeline::{ExecContext, StatementPipeline};
use crate::private_log::PrivateLog;
use crate::store::ConnectionStore;
use crate::workers::WorkerPool;
use sqlgate_auth::{Authenticator, SessionTokenProvider};
use sqlgate_commons::{GatewayError, GatewayResult, UserId};
use sqlgate_driver::DatabaseConfigurator;
use sqlgate_filestore::BlobDir;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Server-elected behavior knobs, fixed at startup.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Stateless mode: a fresh connection per request, no stored handles,
    /// and transaction-control actions are refused.
    pub stateless: bool,
    /// Attach the driver's cause chain as the `stack_trace` envelope field.
    pub include_stack_traces: bool,
    /// Clients HTML-escape CLOB text on upload; reverse it before the driver.
    pub html_escaped_clobs: bool,
    /// Idle threshold for reaping stateful connections, and the age past
    /// which spooled blob files are deleted.
    pub session_idle: Duration,
    pub reaper_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            stateless: false,
            include_stack_traces: false,
            html_escaped_clobs: false,
            session_idle: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

pub struct AppContext {
    configurators: HashMap<String, Arc<dyn DatabaseConfigurator>>,
    pub store: Arc<ConnectionStore>,
    pub sessions: Arc<dyn SessionTokenProvider>,
    pub authenticator: Arc<dyn Authenticator>,
    pub pipeline: Arc<StatementPipeline>,
    pub workers: Arc<WorkerPool>,
    pub private_log: Arc<PrivateLog>,
    pub settings: GatewaySettings,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        configurators: Vec<Arc<dyn DatabaseConfigurator>>,
        sessions: Arc<dyn SessionTokenProvider>,
        authenticator: Arc<dyn Authenticator>,
        pipeline: StatementPipeline,
        workers: WorkerPool,
        private_log: PrivateLog,
        settings: GatewaySettings,
    ) -> Self {
        let configurators = configurators
            .into_iter()
            .map(|c| (c.database().to_string(), c))
            .collect();
        Self {
            configurators,
            store: Arc::new(ConnectionStore::new()),
            sessions,
            authenticator,
            pipeline: Arc::new(pipeline),
            workers: Arc::new(workers),
            private_log: Arc::new(private_log),
            settings,
        }
    }

    /// Configurator for a served database name.
    pub fn configurator(&self, database: &str) -> GatewayResult<Arc<dyn DatabaseConfigurator>> {
        self.configurators
            .get(database)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("unknown database {database:?}")))
    }

    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configurators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Assemble the per-request execution context for one user and database.
    pub fn exec_context(
        &self,
        username: &UserId,
        database: &str,
        client_ip: Option<String>,
    ) -> GatewayResult<ExecContext> {
        let configurator = self.configurator(database)?;
        Ok(ExecContext {
            username: username.clone(),
            database: database.to_string(),
            client_ip,
            blob_dir: BlobDir::new(configurator.blob_directory(username)),
            log_target: configurator.log_target(),
            html_unescape_clobs: self.settings.html_escaped_clobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_auth::{PermissiveAuthenticator, UuidSessionProvider};
    use sqlgate_driver::SqliteConfigurator;

    fn context(dir: &tempfile::TempDir) -> AppContext {
        let configurator = SqliteConfigurator::new(
            "testdb",
            dir.path().join("test.db"),
            dir.path().join("blobs"),
        );
        AppContext::new(
            vec![Arc::new(configurator)],
            Arc::new(UuidSessionProvider::new()),
            Arc::new(PermissiveAuthenticator),
            StatementPipeline::new(Vec::new(), Vec::new()),
            WorkerPool::new(4, 4, Duration::from_secs(30)),
            PrivateLog::open(dir.path().join("private.log"), 1024).unwrap(),
            GatewaySettings::default(),
        )
    }

    #[test]
    fn test_configurator_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        assert_eq!(ctx.databases(), vec!["testdb".to_string()]);
        assert!(ctx.configurator("testdb").is_ok());
        assert!(matches!(
            ctx.configurator("nope"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn test_exec_context_uses_per_user_blob_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let user = UserId::try_new("joe").unwrap();
        let exec = ctx.exec_context(&user, "testdb", None).unwrap();
        assert!(exec.blob_dir.path().ends_with("testdb/joe"));
        assert_eq!(exec.log_target, "sqlgate::db::testdb");
    }
}

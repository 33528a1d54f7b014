// Configuration module
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Main server configuration, loaded from `server.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub gateway: GatewaySection,
    /// Served databases, keyed by the name clients put in the login path.
    pub databases: HashMap<String, DatabaseSettings>,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub firewall: FirewallSettings,
    #[serde(default)]
    pub listeners: ListenerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout: u64,
}

/// Gateway behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Stateless mode: one native connection per request, nothing stored.
    #[serde(default)]
    pub stateless: bool,
    /// Attach driver cause chains to failure envelopes.
    #[serde(default)]
    pub include_stack_traces: bool,
    /// Clients HTML-escape CLOB text; reverse it server-side.
    #[serde(default)]
    pub html_escaped_clobs: bool,
    /// Idle threshold (seconds) before the reaper closes a connection and
    /// deletes stale spooled blob files.
    #[serde(default = "default_session_idle")]
    pub session_idle_seconds: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            stateless: false,
            include_stack_traces: false,
            html_escaped_clobs: false,
            session_idle_seconds: default_session_idle(),
            reaper_interval_seconds: default_reaper_interval(),
        }
    }
}

/// One served database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file path.
    pub path: String,
    /// Base directory for spooled large objects. Per-user subdirectories
    /// are created under it on demand.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,
}

/// Worker pool bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Per-statement execution ceiling in seconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_depth: default_queue_depth(),
            max_wait_seconds: default_max_wait(),
        }
    }
}

/// SQL firewall chain, consulted in order. Empty means allow everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallSettings {
    #[serde(default)]
    pub chain: Vec<String>,
}

/// Change listeners notified after modifying statements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerSettings {
    #[serde(default)]
    pub chain: Vec<String>,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// `permissive` or `static`.
    #[serde(default = "default_authenticator")]
    pub authenticator: String,
    /// Username → password table for the `static` authenticator.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authenticator: default_authenticator(),
            users: HashMap::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Per-target level overrides, e.g. `"sqlgate::db::testdb" = "debug"`.
    #[serde(default)]
    pub targets: HashMap<String, String>,
    /// Server-private diagnostics log for uncaught internal failures.
    #[serde(default = "default_private_log")]
    pub private_log_path: String,
    #[serde(default = "default_private_log_max_bytes")]
    pub private_log_max_bytes: u64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: default_log_file(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
            private_log_path: default_private_log(),
            private_log_max_bytes: default_private_log_max_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: ServerConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.databases.is_empty() {
            anyhow::bail!("at least one [databases.NAME] section is required");
        }
        if self.pool.max_concurrent == 0 {
            anyhow::bail!("pool.max_concurrent must be at least 1");
        }
        if self.auth.authenticator == "static" && self.auth.users.is_empty() {
            anyhow::bail!("auth.authenticator = \"static\" requires [auth.users] entries");
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    0 // 0 = one per CPU
}

fn default_keepalive_timeout() -> u64 {
    75
}

fn default_session_idle() -> u64 {
    30 * 60
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_blob_dir() -> String {
    "./data/blobs".to_string()
}

fn default_max_concurrent() -> usize {
    32
}

fn default_queue_depth() -> usize {
    64
}

fn default_max_wait() -> u64 {
    120
}

fn default_authenticator() -> String {
    "permissive".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "./logs/server.log".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_private_log() -> String {
    "./logs/private_error.log".to_string()
}

fn default_private_log_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

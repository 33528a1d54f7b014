//! The SQL firewall chain.
//!
//! Firewalls are consulted in registration order before every statement
//! execution; the first denial wins and the statement never reaches the
//! driver. The denying firewall's `on_refused` hook runs before the denial is
//! reported, so audit trails see every refusal.

use log::warn;
use sqlgate_commons::UserId;

/// Everything a firewall may inspect about a pending statement.
#[derive(Debug)]
pub struct SqlContext<'a> {
    pub username: &'a UserId,
    pub database: &'a str,
    pub client_ip: Option<&'a str>,
    pub sql: &'a str,
    pub prepared: bool,
    /// Formatted `index=value (TYPE)` snapshot of the parameters.
    pub parameter_snapshot: &'a str,
    /// Set by the pipeline's statement classifier.
    pub is_modifying: bool,
    pub is_ddl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallDecision {
    Allow,
    Deny(String),
}

pub trait SqlFirewall: Send + Sync {
    /// Registry name of this implementation.
    fn name(&self) -> &'static str;

    /// Gate a statement (plain, prepared, or one entry of a batch).
    fn allow_sql(&self, ctx: &SqlContext<'_>) -> FirewallDecision;

    /// Gate the raw `execute` path. Defaults to the statement decision.
    fn allow_execute(&self, ctx: &SqlContext<'_>) -> FirewallDecision {
        self.allow_sql(ctx)
    }

    /// Gate metadata queries (table listing, table details).
    fn allow_metadata_query(&self, _username: &UserId, _database: &str) -> FirewallDecision {
        FirewallDecision::Allow
    }

    /// Audit hook invoked when this firewall denies. The default writes the
    /// refusal, the SQL text, and the parameter snapshot to the audit target.
    fn on_refused(&self, ctx: &SqlContext<'_>, reason: &str) {
        warn!(
            target: "sqlgate::firewall",
            "refused [{}] user={} db={} ip={} sql={:?} params=[{}]: {}",
            self.name(),
            ctx.username,
            ctx.database,
            ctx.client_ip.unwrap_or("-"),
            ctx.sql,
            ctx.parameter_snapshot,
            reason
        );
    }
}

/// Allows everything. The default chain entry.
pub struct AllowAllFirewall;

impl SqlFirewall for AllowAllFirewall {
    fn name(&self) -> &'static str {
        "allow_all"
    }

    fn allow_sql(&self, _ctx: &SqlContext<'_>) -> FirewallDecision {
        FirewallDecision::Allow
    }
}

/// Denies INSERT/UPDATE/DELETE and DDL, leaving the database read-only for
/// gateway clients.
pub struct ReadOnlyFirewall;

impl SqlFirewall for ReadOnlyFirewall {
    fn name(&self) -> &'static str {
        "read_only"
    }

    fn allow_sql(&self, ctx: &SqlContext<'_>) -> FirewallDecision {
        if ctx.is_modifying || ctx.is_ddl {
            FirewallDecision::Deny(format!(
                "database {} is read-only through this gateway, statement not allowed",
                ctx.database
            ))
        } else {
            FirewallDecision::Allow
        }
    }
}

/// Denies DDL only.
pub struct DenyDdlFirewall;

impl SqlFirewall for DenyDdlFirewall {
    fn name(&self) -> &'static str {
        "deny_ddl"
    }

    fn allow_sql(&self, ctx: &SqlContext<'_>) -> FirewallDecision {
        if ctx.is_ddl {
            FirewallDecision::Deny("DDL statements are not allowed".to_string())
        } else {
            FirewallDecision::Allow
        }
    }
}

/// Denies schema introspection through the metadata endpoints.
pub struct DenyMetadataFirewall;

impl SqlFirewall for DenyMetadataFirewall {
    fn name(&self) -> &'static str {
        "deny_metadata"
    }

    fn allow_sql(&self, _ctx: &SqlContext<'_>) -> FirewallDecision {
        FirewallDecision::Allow
    }

    fn allow_metadata_query(&self, _username: &UserId, database: &str) -> FirewallDecision {
        FirewallDecision::Deny(format!("metadata queries on {database} are not allowed"))
    }
}

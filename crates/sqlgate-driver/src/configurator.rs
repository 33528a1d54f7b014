//! The database configurator collaborator.
//!
//! One configurator per served database name. It is the only component that
//! constructs native connections; it also owns the per-user blob directory
//! layout and the per-database log target.

use crate::{DriverConnection, DriverResult};
use sqlgate_commons::UserId;
use std::path::PathBuf;

pub trait DatabaseConfigurator: Send + Sync {
    /// Database name this configurator serves.
    fn database(&self) -> &str;

    /// Open a fresh native connection.
    fn connection(&self) -> DriverResult<Box<dyn DriverConnection>>;

    /// Directory for this user's spooled large objects. Not created here;
    /// the filestore creates it on demand.
    fn blob_directory(&self, user: &UserId) -> PathBuf;

    /// `log` target for statements against this database, so per-database
    /// log levels can be tuned through the subscriber filter.
    fn log_target(&self) -> String;
}

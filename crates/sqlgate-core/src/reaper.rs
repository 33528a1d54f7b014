//! Idle-connection and stale-blob reaper.
//!
//! One supervised task per served database, scheduled once at startup. Each
//! pass closes stateful connections idle beyond the threshold and deletes
//! spooled blob files older than the same threshold from the affected users'
//! directories. The pass itself is idempotent, so an overlapping or repeated
//! run is harmless; entries currently in use are skipped and retried on the
//! next tick.

use crate::store::ConnectionStore;
use log::{debug, info, warn};
use sqlgate_driver::DatabaseConfigurator;
use sqlgate_filestore::delete_stale_files;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One reaper pass. Returns `(connections closed, blob files deleted)`.
pub fn reap_once(
    store: &ConnectionStore,
    configurator: &dyn DatabaseConfigurator,
    max_idle: Duration,
) -> (usize, usize) {
    let database = configurator.database();
    let (removed, mut users) = store.remove_idle(database, max_idle);
    let closed = removed.len();
    for entry in removed {
        let mut entry = entry.lock();
        if let Err(e) = entry.conn.rollback() {
            warn!(
                target: "sqlgate::reaper",
                "rollback while reaping connection {} failed: {e}",
                entry.connection_id
            );
        }
        debug!(
            target: "sqlgate::reaper",
            "reaped idle connection {} (user={}, db={})",
            entry.connection_id, entry.username, database
        );
    }
    // Stale spool files are swept for every user still holding connections
    // too, not only for the ones just reaped.
    for user in store.users_of_database(database) {
        if !users.contains(&user) {
            users.push(user);
        }
    }
    let mut deleted = 0;
    for user in &users {
        deleted += delete_stale_files(&configurator.blob_directory(user), max_idle);
    }
    if closed > 0 || deleted > 0 {
        info!(
            target: "sqlgate::reaper",
            "db={database}: closed {closed} idle connections, deleted {deleted} stale blob files"
        );
    }
    (closed, deleted)
}

/// Start the periodic reaper for one database.
pub fn spawn_reaper(
    store: Arc<ConnectionStore>,
    configurator: Arc<dyn DatabaseConfigurator>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let store = store.clone();
            let configurator = configurator.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                reap_once(&store, configurator.as_ref(), max_idle)
            })
            .await;
            if let Err(e) = outcome {
                warn!(target: "sqlgate::reaper", "reaper pass aborted: {e}");
            }
        }
    })
}

//! Process-wide session & connection store.
//!
//! Live native connections for stateful sessions are keyed by
//! `(username, session id, connection id)` in a concurrency-safe map, so
//! independent sessions proceed in parallel with no global lock. Each entry
//! sits behind its own mutex: at most one in-flight request can use a
//! connection id at a time, which is the single-writer invariant the rest of
//! the gateway relies on.

use dashmap::DashMap;
use parking_lot::Mutex;
use sqlgate_commons::{ConnectionId, SessionId, UserId};
use sqlgate_driver::DriverConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One stateful connection with its bookkeeping.
pub struct ConnectionEntry {
    pub username: UserId,
    pub session_id: SessionId,
    pub connection_id: ConnectionId,
    pub database: String,
    pub conn: Box<dyn DriverConnection>,
    pub last_touched: Instant,
    /// Serialized row identifiers handed to the client, for later reference.
    pub rowid_registry: HashMap<String, i64>,
}

impl ConnectionEntry {
    pub fn new(
        username: UserId,
        session_id: SessionId,
        database: String,
        conn: Box<dyn DriverConnection>,
    ) -> Self {
        let connection_id = ConnectionId::new(conn.connection_token().to_string());
        Self {
            username,
            session_id,
            connection_id,
            database,
            conn,
            last_touched: Instant::now(),
            rowid_registry: HashMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }
}

type StoreKey = (String, String, String);

/// Registry of live stateful connections.
#[derive(Default)]
pub struct ConnectionStore {
    entries: DashMap<StoreKey, Arc<Mutex<ConnectionEntry>>>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user: &UserId, session: &SessionId, connection: &ConnectionId) -> StoreKey {
        (
            user.as_str().to_string(),
            session.as_str().to_string(),
            connection.as_str().to_string(),
        )
    }

    /// Register a freshly opened connection and return its id.
    pub fn put(&self, entry: ConnectionEntry) -> ConnectionId {
        let id = entry.connection_id.clone();
        let key = Self::key(&entry.username, &entry.session_id, &id);
        self.entries.insert(key, Arc::new(Mutex::new(entry)));
        id
    }

    /// Look up a connection. With `None`, the first connection of the session
    /// is selected (legacy clients omit the connection id).
    pub fn get(
        &self,
        user: &UserId,
        session: &SessionId,
        connection: Option<&ConnectionId>,
    ) -> Option<Arc<Mutex<ConnectionEntry>>> {
        match connection {
            Some(cid) => self
                .entries
                .get(&Self::key(user, session, cid))
                .map(|e| e.value().clone()),
            None => self.first_of_session(user, session),
        }
    }

    fn first_of_session(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Option<Arc<Mutex<ConnectionEntry>>> {
        self.entries
            .iter()
            .filter(|e| e.key().0 == user.as_str() && e.key().1 == session.as_str())
            .min_by_key(|e| Self::connection_order(&e.key().2))
            .map(|e| e.value().clone())
    }

    /// Ordering key for the earliest-opened connection of a session.
    /// Connection ids are driver tokens, numeric in practice, so "9" must
    /// come before "10"; non-numeric ids fall back to string order.
    fn connection_order(id: &str) -> (bool, u64, String) {
        match id.parse::<u64>() {
            Ok(n) => (false, n, String::new()),
            Err(_) => (true, 0, id.to_string()),
        }
    }

    /// Remove one connection, returning it so the caller can close it.
    pub fn remove(
        &self,
        user: &UserId,
        session: &SessionId,
        connection: &ConnectionId,
    ) -> Option<Arc<Mutex<ConnectionEntry>>> {
        self.entries
            .remove(&Self::key(user, session, connection))
            .map(|(_, e)| e)
    }

    /// Remove every connection of a session (logout), returning them.
    pub fn remove_session(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Vec<Arc<Mutex<ConnectionEntry>>> {
        let keys: Vec<StoreKey> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == user.as_str() && e.key().1 == session.as_str())
            .map(|e| e.key().clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|(_, e)| e))
            .collect()
    }

    /// Remove every remaining connection, returning them. Used at shutdown
    /// so callers can roll back whatever the sessions still hold.
    pub fn drain(&self) -> Vec<Arc<Mutex<ConnectionEntry>>> {
        let keys: Vec<StoreKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|(_, e)| e))
            .collect()
    }

    /// Remove entries of one database idle longer than `max_idle`. Entries
    /// currently in use (locked) are skipped; the reaper retries next tick.
    /// Returns the removed entries and the distinct users they belonged to.
    pub fn remove_idle(
        &self,
        database: &str,
        max_idle: Duration,
    ) -> (Vec<Arc<Mutex<ConnectionEntry>>>, Vec<UserId>) {
        let now = Instant::now();
        let mut idle_keys = Vec::new();
        for e in self.entries.iter() {
            let Some(entry) = e.value().try_lock() else {
                continue;
            };
            if entry.database == database && now.duration_since(entry.last_touched) > max_idle {
                idle_keys.push(e.key().clone());
            }
        }
        let mut removed = Vec::new();
        let mut users = Vec::new();
        for key in idle_keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                let user = entry.lock().username.clone();
                if !users.contains(&user) {
                    users.push(user);
                }
                removed.push(entry);
            }
        }
        (removed, users)
    }

    /// Distinct users with live connections against `database`.
    pub fn users_of_database(&self, database: &str) -> Vec<UserId> {
        let mut users = Vec::new();
        for e in self.entries.iter() {
            if let Some(entry) = e.value().try_lock() {
                if entry.database == database && !users.contains(&entry.username) {
                    users.push(entry.username.clone());
                }
            }
        }
        users
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

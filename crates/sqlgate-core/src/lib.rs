//! # sqlgate-core
//!
//! The gateway's execution core: the session & connection store with its
//! reaper, the statement execution pipeline (authorize → execute →
//! notify/rollback), the streaming result encoder, the bounded worker pool,
//! and the application context that wires the collaborators together at
//! startup.

pub mod app_context;
pub mod classifier;
pub mod encoder;
pub mod listener;
pub mod pipeline;
pub mod private_log;
pub mod reaper;
pub mod store;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;

pub use app_context::{AppContext, GatewaySettings};
pub use classifier::{classify, StatementKind};
pub use encoder::{EncodeSettings, QueryEncoder};
pub use listener::{build_listeners, LoggingUpdateListener, NoOpListener, UpdateEvent, UpdateListener};
pub use pipeline::{ExecContext, RawOutcome, StatementPipeline};
pub use private_log::PrivateLog;
pub use reaper::{reap_once, spawn_reaper};
pub use store::{ConnectionEntry, ConnectionStore};
pub use workers::WorkerPool;

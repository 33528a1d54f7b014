//! Server-private diagnostics log.
//!
//! Unanticipated failures are reported to the client as a generic internal
//! error; the full detail lands here instead, so operators can inspect it
//! without leaking internals over the wire. Writing is best-effort: a broken
//! diagnostics log must never take a request down with it.

use chrono::Utc;
use log::warn;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PrivateLog {
    inner: Mutex<Inner>,
}

struct Inner {
    path: PathBuf,
    max_bytes: u64,
    file: Option<File>,
}

impl PrivateLog {
    /// Opens (creating if needed) the private log at `path`. When the file
    /// grows past `max_bytes` it is rotated once to `<path>.old`.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = Self::append_handle(&path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                path,
                max_bytes,
                file: Some(file),
            }),
        })
    }

    fn append_handle(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Append one timestamped record. Failures are downgraded to a warning.
    pub fn record(&self, context: &str, detail: &str) {
        let line = format!(
            "{} [{}] {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            context,
            detail.replace('\n', " | ")
        );
        let mut inner = self.inner.lock();
        if let Err(e) = inner.append(&line) {
            warn!(target: "sqlgate::private_log", "failed to write private log: {e}");
        }
    }
}

impl Inner {
    fn append(&mut self, line: &str) -> std::io::Result<()> {
        self.rotate_if_needed()?;
        if self.file.is_none() {
            self.file = Some(PrivateLog::append_handle(&self.path)?);
        }
        let file = self.file.as_mut().ok_or(std::io::ErrorKind::Other)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if len < self.max_bytes {
            return Ok(());
        }
        self.file = None;
        let mut old = self.path.clone().into_os_string();
        old.push(".old");
        fs::rename(&self.path, PathBuf::from(old))?;
        self.file = Some(PrivateLog::append_handle(&self.path)?);
        Ok(())
    }
}

//! # sqlgate-filestore
//!
//! Spooling of large objects to local disk. Every user gets a blob directory
//! (created on demand); spooled files are named by a generated unique id with
//! a `.blob` or `.clob.txt` suffix. A SQL NULL large object is recorded as a
//! `.null` sentinel file so the null/absent distinction survives the round
//! trip to the client.
//!
//! All copies are buffered and chunked; no file is ever held in memory whole.

pub mod cleanup;

pub use cleanup::delete_stale_files;

use sqlgate_commons::GatewayError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Copy buffer for spool transfers.
const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum FilestoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid blob id: {0}")]
    InvalidId(String),

    #[error("blob not found: {0}")]
    NotFound(String),
}

impl From<FilestoreError> for GatewayError {
    fn from(err: FilestoreError) -> Self {
        match err {
            FilestoreError::NotFound(id) => GatewayError::NotFound(format!("blob {id}")),
            FilestoreError::InvalidId(id) => GatewayError::Parameter(format!("invalid blob id {id:?}")),
            FilestoreError::Io(e) => GatewayError::Internal(format!("blob spool failure: {e}")),
        }
    }
}

pub type FilestoreResult<T> = Result<T, FilestoreError>;

/// One user's spool directory.
#[derive(Debug, Clone)]
pub struct BlobDir {
    dir: PathBuf,
}

impl BlobDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn ensure(&self) -> FilestoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Generate a fresh binary blob id.
    pub fn new_blob_id() -> String {
        format!("{}.blob", Uuid::new_v4().simple())
    }

    /// Generate a fresh spooled-text id.
    pub fn new_clob_id() -> String {
        format!("{}.clob.txt", Uuid::new_v4().simple())
    }

    fn file_path(&self, blob_id: &str) -> FilestoreResult<PathBuf> {
        validate_blob_id(blob_id)?;
        Ok(self.dir.join(blob_id))
    }

    /// Open a writer for an uploaded blob; the caller streams chunks into it.
    pub fn create(&self, blob_id: &str) -> FilestoreResult<BufWriter<File>> {
        self.ensure()?;
        let path = self.file_path(blob_id)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(BufWriter::new(file))
    }

    /// Spool a whole stream under a new id and return the id.
    pub fn spool(&self, blob_id: &str, reader: &mut dyn Read) -> FilestoreResult<u64> {
        let mut writer = self.create(blob_id)?;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
        writer.flush()?;
        Ok(total)
    }

    /// Spool text (CLOB) under a new id.
    pub fn spool_text(&self, blob_id: &str, text: &str) -> FilestoreResult<()> {
        let mut writer = self.create(blob_id)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Record a SQL NULL large object: a sentinel marker file, not an empty
    /// blob file.
    pub fn spool_null(&self, blob_id: &str) -> FilestoreResult<()> {
        self.ensure()?;
        validate_blob_id(blob_id)?;
        File::create(self.dir.join(format!("{blob_id}.null")))?;
        Ok(())
    }

    /// True when the id refers to a spooled NULL.
    pub fn is_null(&self, blob_id: &str) -> FilestoreResult<bool> {
        validate_blob_id(blob_id)?;
        Ok(self.dir.join(format!("{blob_id}.null")).is_file())
    }

    /// Open a spooled blob for buffered streaming download.
    pub fn open(&self, blob_id: &str) -> FilestoreResult<BufReader<File>> {
        let path = self.file_path(blob_id)?;
        if !path.is_file() {
            return Err(FilestoreError::NotFound(blob_id.to_string()));
        }
        Ok(BufReader::new(File::open(path)?))
    }

    /// Exact byte length of a spooled blob. A spooled NULL reports zero.
    pub fn length(&self, blob_id: &str) -> FilestoreResult<u64> {
        let path = self.file_path(blob_id)?;
        if path.is_file() {
            return Ok(fs::metadata(path)?.len());
        }
        if self.is_null(blob_id)? {
            return Ok(0);
        }
        Err(FilestoreError::NotFound(blob_id.to_string()))
    }

    /// Read a spooled blob fully, for binding as a statement parameter.
    pub fn read_bytes(&self, blob_id: &str) -> FilestoreResult<Vec<u8>> {
        let mut reader = self.open(blob_id)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a spooled CLOB as text.
    pub fn read_text(&self, blob_id: &str) -> FilestoreResult<String> {
        let bytes = self.read_bytes(blob_id)?;
        String::from_utf8(bytes)
            .map_err(|_| FilestoreError::InvalidId(format!("{blob_id} is not valid UTF-8 text")))
    }
}

/// Blob ids are server-generated file names; anything that could walk the
/// directory tree is rejected before touching the filesystem.
fn validate_blob_id(blob_id: &str) -> FilestoreResult<()> {
    let ok = !blob_id.is_empty()
        && blob_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && !blob_id.contains("..");
    if ok {
        Ok(())
    } else {
        Err(FilestoreError::InvalidId(blob_id.to_string()))
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use winewarden_core::error::WineWardenError;

use super::record::AuditRecord;

/// Ordered destination for audit records.
///
/// `append` receives records in sequence order and may only buffer them;
/// `flush` makes everything appended so far durable. A failed `append` must
/// not have accepted the record, since the trail retries from that record.
pub trait AuditSink: Send {
    fn append(&mut self, record: &AuditRecord) -> Result<(), WineWardenError>;
    fn flush(&mut self) -> Result<(), WineWardenError>;
}

/// Keeps records in memory behind a shared handle.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares the underlying storage; the engine owns the sink, tests keep
    /// the handle.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn append(&mut self, record: &AuditRecord) -> Result<(), WineWardenError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WineWardenError> {
        Ok(())
    }
}

/// Lines held in memory before `append` writes them out on its own.
const WRITE_THRESHOLD: usize = 64 * 1024;

/// One JSON object per line.
///
/// Records are buffered as whole lines and written on `flush` (or once the
/// buffer passes a size threshold). A failed write truncates the file back to
/// its last complete line and keeps the batch, so a retry never leaves a torn
/// or duplicated line behind.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    buffer: Vec<u8>,
    /// Length of the file prefix made of complete lines.
    written: u64,
}

impl JsonlSink {
    /// Starts a fresh log, truncating whatever the file held: a trail always
    /// begins its chain at sequence 0.
    pub fn create(path: &Path) -> Result<Self, WineWardenError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|err| io_error(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffer: Vec::new(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_buffer(&mut self) -> Result<(), WineWardenError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let outcome = self
            .file
            .seek(SeekFrom::Start(self.written))
            .and_then(|_| self.file.write_all(&self.buffer))
            .and_then(|_| self.file.flush());
        match outcome {
            Ok(()) => {
                self.written += self.buffer.len() as u64;
                self.buffer.clear();
                Ok(())
            }
            Err(err) => {
                // Best effort; the next write seeks back to `written` anyway.
                let _ = self.file.set_len(self.written);
                Err(WineWardenError::AuditSinkUnavailable(format!(
                    "write {}: {err}",
                    self.path.display()
                )))
            }
        }
    }
}

impl AuditSink for JsonlSink {
    fn append(&mut self, record: &AuditRecord) -> Result<(), WineWardenError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|err| WineWardenError::AuditSinkUnavailable(format!("encode record: {err}")))?;
        line.push(b'\n');
        if self.buffer.len() >= WRITE_THRESHOLD {
            self.write_buffer()?;
        }
        self.buffer.extend_from_slice(&line);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WineWardenError> {
        self.write_buffer()
    }
}

fn io_error(path: &Path, err: std::io::Error) -> WineWardenError {
    WineWardenError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

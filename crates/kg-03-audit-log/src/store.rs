//! # Audit Stores
//!
//! Persistence behind the audit writer. Stores are append-only: the writer
//! task is the only caller of [`AuditStore::append`], and nothing ever
//! rewrites a stored entry.
//!
//! - [`InMemoryAuditStore`]: tests and ephemeral deployments
//! - [`FileAuditStore`]: JSON lines, one entry per line, synced per append

use crate::domain::AuditEntry;
use crate::error::{AuditError, AuditResult};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Append-only entry storage.
pub trait AuditStore: Send + Sync {
    /// Persist one entry. Must be durable before returning.
    fn append(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// All stored entries in sequence order.
    ///
    /// An entry that cannot be decoded is reported as a chain violation at
    /// its position.
    fn load(&self) -> AuditResult<Vec<AuditEntry>>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a stored entry in place, simulating storage-level tampering.
    #[cfg(any(test, feature = "test-util"))]
    pub fn tamper(&self, sequence_no: u64, edit: impl FnOnce(&mut AuditEntry)) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(sequence_no as usize) {
            Some(entry) => {
                edit(entry);
                true
            }
            None => false,
        }
    }

    /// Drop a stored entry, simulating deletion.
    #[cfg(any(test, feature = "test-util"))]
    pub fn remove(&self, sequence_no: u64) -> Option<AuditEntry> {
        let mut entries = self.entries.write();
        let index = sequence_no as usize;
        (index < entries.len()).then(|| entries.remove(index))
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn load(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self.entries.read().clone())
    }

    fn len(&self) -> u64 {
        self.entries.read().len() as u64
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON-lines file store.
///
/// A failed write is rolled back to the last complete line, so a torn entry
/// never reaches the next reader.
#[derive(Debug)]
pub struct FileAuditStore {
    path: PathBuf,
    file: Mutex<AppendFile>,
    count: RwLock<u64>,
    #[cfg(any(test, feature = "test-util"))]
    fail_next_write: std::sync::atomic::AtomicBool,
}

#[derive(Debug)]
struct AppendFile {
    file: File,
    /// Length of the file up to the last complete line.
    committed: u64,
}

impl FileAuditStore {
    /// Open (or create) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let committed = file.metadata()?.len();
        let count = BufReader::new(File::open(&path)?)
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .count() as u64;

        Ok(Self {
            path,
            file: Mutex::new(AppendFile { file, committed }),
            count: RwLock::new(count),
            #[cfg(any(test, feature = "test-util"))]
            fail_next_write: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make the next append write half its line and then fail.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_write(&self) {
        self.fail_next_write
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn write_line(&self, file: &mut File, line: &[u8]) -> std::io::Result<()> {
        #[cfg(any(test, feature = "test-util"))]
        if self
            .fail_next_write
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            file.write_all(&line[..line.len() / 2])?;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"));
        }
        file.write_all(line)?;
        file.sync_data()
    }
}

impl AuditStore for FileAuditStore {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut guard = self.file.lock();
        let AppendFile { file, committed } = &mut *guard;
        if let Err(err) = self.write_line(file, &line) {
            if let Err(rollback) = file.set_len(*committed) {
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Audit file rollback failed"
                );
            }
            warn!(
                path = %self.path.display(),
                sequence_no = entry.sequence_no,
                error = %err,
                "Audit write failed, partial line discarded"
            );
            return Err(err.into());
        }
        *committed += line.len() as u64;
        *self.count.write() += 1;
        Ok(())
    }

    fn load(&self) -> AuditResult<Vec<AuditEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|_| {
                AuditError::ChainIntegrityViolation {
                    at_sequence: entries.len() as u64,
                }
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn len(&self) -> u64 {
        *self.count.read()
    }
}

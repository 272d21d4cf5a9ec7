//! # Audit Writer
//!
//! [`AuditLog`] is the handle every subsystem holds. All mutations go
//! through one writer task over an mpsc queue, so sequence numbers are dense
//! and `prev_hash` always links to the entry written just before.
//!
//! ## Integrity Halt
//!
//! A failed verification (on open or via [`AuditLog::verify_chain`]) halts
//! the log. While halted every append fails with [`AuditError::Halted`],
//! which in turn stops every audited decision. Only
//! [`AuditLog::clear_integrity_halt`] resumes it.

use crate::domain::{genesis_hash, verify_entries, AuditEntry, AuditEvent};
use crate::error::{AuditError, AuditResult};
use crate::hasher::{ChainHash, ChainHasher};
use crate::store::AuditStore;
use gateway_telemetry::{metric_inc, AUDIT_ENTRIES, AUDIT_INTEGRITY_VIOLATIONS};
use parking_lot::RwLock;
use serde::Serialize;
use shared_types::{Clock, RequestId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Depth of the writer queue.
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Snapshot of the log for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total_entries: u64,
    pub counts: BTreeMap<String, u64>,
    pub last_hash: ChainHash,
    pub hasher: &'static str,
    pub halted: bool,
    pub halted_at: Option<u64>,
}

enum AuditCommand {
    Append {
        event: AuditEvent,
        reply: oneshot::Sender<AuditResult<AuditEntry>>,
    },
    Verify {
        reply: oneshot::Sender<AuditResult<u64>>,
    },
    ClearHalt {
        operator: String,
        reply: oneshot::Sender<AuditResult<AuditEntry>>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Tail {
    next_sequence: u64,
    last_hash: ChainHash,
}

struct Shared {
    store: Arc<dyn AuditStore>,
    hasher: Arc<dyn ChainHasher>,
    clock: Arc<dyn Clock>,
    halted_at: RwLock<Option<u64>>,
    tail: RwLock<Tail>,
    counts: RwLock<BTreeMap<String, u64>>,
}

impl Shared {
    fn halt(&self, at_sequence: u64) {
        *self.halted_at.write() = Some(at_sequence);
        metric_inc!(AUDIT_INTEGRITY_VIOLATIONS);
        error!(
            at_sequence,
            "Audit chain integrity violation, audited decisions halted"
        );
    }

    /// Re-read the tail from storage, trusting whatever is stored.
    fn reload_tail(&self) -> AuditResult<()> {
        let entries = self.store.load()?;
        let last_hash = entries
            .last()
            .map(|entry| entry.entry_hash)
            .unwrap_or_else(|| genesis_hash(self.hasher.as_ref()));
        *self.tail.write() = Tail {
            next_sequence: entries.len() as u64,
            last_hash,
        };
        Ok(())
    }

    fn append(&self, event: AuditEvent) -> AuditResult<AuditEntry> {
        let tail = *self.tail.read();
        let entry = AuditEntry::seal(
            self.hasher.as_ref(),
            tail.next_sequence,
            tail.last_hash,
            self.clock.now_secs(),
            event,
        )?;
        self.store.append(&entry)?;

        *self.tail.write() = Tail {
            next_sequence: entry.sequence_no + 1,
            last_hash: entry.entry_hash,
        };
        *self
            .counts
            .write()
            .entry(entry.event_type().to_string())
            .or_insert(0) += 1;
        metric_inc!(AUDIT_ENTRIES);
        debug!(
            sequence_no = entry.sequence_no,
            event_type = entry.event_type(),
            "Audit entry appended"
        );
        Ok(entry)
    }

    fn verify(&self) -> AuditResult<u64> {
        let result = self
            .store
            .load()
            .and_then(|entries| verify_entries(self.hasher.as_ref(), &entries));
        if let Err(AuditError::ChainIntegrityViolation { at_sequence }) = result {
            self.halt(at_sequence);
        }
        result
    }
}

/// Handle to the hash-chained audit log.
#[derive(Clone)]
pub struct AuditLog {
    commands: mpsc::Sender<AuditCommand>,
    shared: Arc<Shared>,
}

impl AuditLog {
    /// Open the log over `store`, verifying what is already stored.
    ///
    /// A stored chain that fails verification does not fail `open`; the log
    /// starts halted instead. Must be called inside a Tokio runtime.
    pub fn open(
        store: Arc<dyn AuditStore>,
        hasher: Arc<dyn ChainHasher>,
        clock: Arc<dyn Clock>,
    ) -> AuditResult<Self> {
        let genesis = genesis_hash(hasher.as_ref());
        let shared = Arc::new(Shared {
            store,
            hasher,
            clock,
            halted_at: RwLock::new(None),
            tail: RwLock::new(Tail {
                next_sequence: 0,
                last_hash: genesis,
            }),
            counts: RwLock::new(BTreeMap::new()),
        });

        match shared.store.load() {
            Ok(entries) => {
                let mut counts = shared.counts.write();
                for entry in &entries {
                    *counts.entry(entry.event_type().to_string()).or_insert(0) += 1;
                }
                drop(counts);
                if let Err(AuditError::ChainIntegrityViolation { at_sequence }) =
                    verify_entries(shared.hasher.as_ref(), &entries)
                {
                    shared.halt(at_sequence);
                }
                if let Some(last) = entries.last() {
                    *shared.tail.write() = Tail {
                        next_sequence: entries.len() as u64,
                        last_hash: last.entry_hash,
                    };
                }
            }
            Err(AuditError::ChainIntegrityViolation { at_sequence }) => {
                shared.halt(at_sequence);
            }
            Err(other) => return Err(other),
        }

        let (commands, receiver) = mpsc::channel(AUDIT_QUEUE_CAPACITY);
        tokio::spawn(run_writer(Arc::clone(&shared), receiver));

        info!(
            hasher = shared.hasher.name(),
            entries = shared.store.len(),
            halted = shared.halted_at.read().is_some(),
            "Audit log opened"
        );
        Ok(Self { commands, shared })
    }

    /// Append one event. Fails with [`AuditError::Halted`] while halted.
    pub async fn append(&self, event: AuditEvent) -> AuditResult<AuditEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(AuditCommand::Append { event, reply }).await?;
        rx.await.map_err(|_| AuditError::WriterClosed)?
    }

    /// Re-verify the full stored chain. A violation halts the log.
    pub async fn verify_chain(&self) -> AuditResult<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(AuditCommand::Verify { reply }).await?;
        rx.await.map_err(|_| AuditError::WriterClosed)?
    }

    /// Manual resolution of an integrity halt.
    ///
    /// Records `IntegrityHaltCleared` chained from the current stored tail.
    /// Nothing is re-verified; the operator vouches for the stored state.
    pub async fn clear_integrity_halt(&self, operator: &str) -> AuditResult<AuditEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(AuditCommand::ClearHalt {
            operator: operator.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| AuditError::WriterClosed)?
    }

    /// All entries in sequence order.
    pub fn export(&self) -> AuditResult<Vec<AuditEntry>> {
        self.shared.store.load()
    }

    /// Entries that concern `request_id`, in sequence order.
    pub fn entries_for(&self, request_id: RequestId) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .export()?
            .into_iter()
            .filter(|entry| entry.event.request_id() == Some(request_id))
            .collect())
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halted_at.read().is_some()
    }

    pub fn halted_at(&self) -> Option<u64> {
        *self.shared.halted_at.read()
    }

    pub fn summary(&self) -> AuditSummary {
        let tail = *self.shared.tail.read();
        let halted_at = self.halted_at();
        AuditSummary {
            total_entries: self.shared.store.len(),
            counts: self.shared.counts.read().clone(),
            last_hash: tail.last_hash,
            hasher: self.shared.hasher.name(),
            halted: halted_at.is_some(),
            halted_at,
        }
    }

    async fn send(&self, command: AuditCommand) -> AuditResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AuditError::WriterClosed)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("hasher", &self.shared.hasher.name())
            .field("halted_at", &self.halted_at())
            .finish()
    }
}

async fn run_writer(shared: Arc<Shared>, mut receiver: mpsc::Receiver<AuditCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            AuditCommand::Append { event, reply } => {
                let halted_at = *shared.halted_at.read();
                let result = match halted_at {
                    Some(at_sequence) => Err(AuditError::Halted { at_sequence }),
                    None => on_store(&shared, move |s| s.append(event)).await,
                };
                if let Err(err) = &result {
                    warn!(error = %err, "Audit append refused");
                }
                let _ = reply.send(result);
            }
            AuditCommand::Verify { reply } => {
                let result = on_store(&shared, Shared::verify).await;
                if let Ok(count) = result {
                    debug!(entries = count, "Audit chain verified");
                }
                let _ = reply.send(result);
            }
            AuditCommand::ClearHalt { operator, reply } => {
                let result = on_store(&shared, move |s| clear_halt(s, operator)).await;
                let _ = reply.send(result);
            }
        }
    }
    debug!("Audit writer stopped");
}

/// Run store I/O on the blocking pool. The writer awaits each call, so
/// commands stay serialized.
async fn on_store<T, F>(shared: &Arc<Shared>, op: F) -> AuditResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Shared) -> AuditResult<T> + Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || op(&shared))
        .await
        .map_err(|err| AuditError::Io(format!("audit store task failed: {err}")))?
}

fn clear_halt(shared: &Shared, operator: String) -> AuditResult<AuditEntry> {
    let violation_at = (*shared.halted_at.read()).ok_or(AuditError::NotHalted)?;
    shared.reload_tail()?;
    let entry = shared.append(AuditEvent::IntegrityHaltCleared {
        operator: operator.clone(),
        violation_at,
    })?;
    *shared.halted_at.write() = None;
    warn!(
        operator = %operator,
        violation_at,
        sequence_no = entry.sequence_no,
        "Audit integrity halt cleared by operator"
    );
    Ok(entry)
}

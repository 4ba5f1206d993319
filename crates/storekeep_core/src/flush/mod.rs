//! Session-end reconciliation of staged changes into the record store.
//!
//! # Responsibility
//! - Apply deletes, then inserts, then updates, as one store unit of work.
//! - Report failures with phase and item counts; never propagate them.
//!
//! # Invariants
//! - Exactly one attempt per call; no retries, no deferred re-runs.
//! - The buffer is cleared after every attempt, success or failure.
//! - Provisional identifiers are stripped before insert.
//! - An empty buffer issues no store calls at all; a non-empty one issues
//!   all three phase calls, even for phases with zero items.

use crate::logging::sanitize_message;
use crate::model::record::{Record, RecordId};
use crate::repo::record_store::{RecordStore, RepoError, SharedStore};
use crate::session::{SessionId, TerminationReason};
use crate::staging::buffer::StagingBuffer;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

const MAX_PANIC_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    /// Opening the store's unit of work.
    Begin,
    Delete,
    Insert,
    Update,
    /// Committing the unit of work.
    Commit,
}

impl FlushPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Commit => "commit",
        }
    }
}

impl Display for FlushPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum FlushFailureCause {
    Store(RepoError),
    /// The store panicked; payload is sanitized and truncated.
    Panicked(String),
}

impl Display for FlushFailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Panicked(payload) => write!(f, "record store panicked: {payload}"),
        }
    }
}

/// A flush that did not complete. Staged data in it is lost.
#[derive(Debug)]
pub struct FlushFailure {
    pub phase: FlushPhase,
    /// Items submitted in the failing phase (all pending items for
    /// `Begin`/`Commit`).
    pub items: usize,
    pub cause: FlushFailureCause,
}

impl Display for FlushFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "flush failed in {} phase ({} items): {}",
            self.phase, self.items, self.cause
        )
    }
}

impl Error for FlushFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            FlushFailureCause::Store(err) => Some(err),
            FlushFailureCause::Panicked(_) => None,
        }
    }
}

/// Item counts held by the buffer when the flush started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub deletes: usize,
    pub inserts: usize,
    pub updates: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.deletes + self.inserts + self.updates
    }
}

#[derive(Debug)]
pub struct FlushReport {
    pub session_id: SessionId,
    pub reason: TerminationReason,
    pub pending: PendingCounts,
    /// Rows that actually existed when the delete phase ran.
    pub deleted_rows: usize,
    /// Durable ids assigned to staged-new records, in creation order.
    pub inserted_ids: Vec<RecordId>,
    pub failure: Option<FlushFailure>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Nothing was staged, so the store was never called.
    pub fn was_empty(&self) -> bool {
        self.pending.total() == 0
    }
}

/// Applies one session's staged changes to the record store.
///
/// Holds a direct store handle captured at session creation.
#[derive(Clone)]
pub struct FlushCoordinator {
    store: SharedStore,
}

impl FlushCoordinator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Flushes `buffer`, then clears it unconditionally.
    ///
    /// Callers must hold the session's exclusive lock on `buffer`.
    pub fn flush(
        &self,
        session_id: SessionId,
        reason: TerminationReason,
        buffer: &mut StagingBuffer,
    ) -> FlushReport {
        let started_at = Instant::now();
        let pending = PendingCounts {
            deletes: buffer.deleted_count(),
            inserts: buffer.new_count(),
            updates: buffer.modified_count(),
        };
        let mut report = FlushReport {
            session_id,
            reason,
            pending,
            deleted_rows: 0,
            inserted_ids: Vec::new(),
            failure: None,
        };

        if pending.total() == 0 {
            info!(
                "event=session_flush module=flush status=skipped session_id={session_id} reason={reason}"
            );
            buffer.clear();
            return report;
        }

        let deletes: Vec<RecordId> = buffer.deleted_ids().collect();
        let inserts: Vec<Record> = buffer
            .new_records()
            .map(|(_, record)| {
                let mut record = record.clone();
                record.id = None;
                record
            })
            .collect();
        let updates: Vec<Record> = buffer
            .modified_records()
            .map(|(id, record)| {
                let mut record = record.clone();
                record.id = Some(id);
                record
            })
            .collect();

        let mut reached: Option<FlushPhase> = None;
        let mut finished_phases = false;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.store.atomically(&mut |store: &dyn RecordStore| {
                reached = Some(FlushPhase::Delete);
                report.deleted_rows = store.delete_all_by_id(&deletes)?;

                reached = Some(FlushPhase::Insert);
                report.inserted_ids = store
                    .save_all(&inserts)?
                    .into_iter()
                    .filter_map(|saved| saved.id)
                    .collect();

                reached = Some(FlushPhase::Update);
                store.save_all(&updates)?;

                finished_phases = true;
                Ok(())
            })
        }));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(FlushFailureCause::Store(err)),
            Err(payload) => Some(FlushFailureCause::Panicked(panic_text(payload.as_ref()))),
        };

        if let Some(cause) = failure {
            let phase = match (reached, finished_phases) {
                (_, true) => FlushPhase::Commit,
                (Some(phase), false) => phase,
                (None, false) => FlushPhase::Begin,
            };
            let items = match phase {
                FlushPhase::Delete => pending.deletes,
                FlushPhase::Insert => pending.inserts,
                FlushPhase::Update => pending.updates,
                FlushPhase::Begin | FlushPhase::Commit => pending.total(),
            };
            error!(
                "event=session_flush module=flush status=error session_id={session_id} reason={reason} phase={phase} items={items} pending_deletes={} pending_inserts={} pending_updates={} duration_ms={} data_loss=likely error={cause}",
                pending.deletes,
                pending.inserts,
                pending.updates,
                started_at.elapsed().as_millis()
            );
            report.inserted_ids.clear();
            report.failure = Some(FlushFailure {
                phase,
                items,
                cause,
            });
        } else {
            info!(
                "event=session_flush module=flush status=ok session_id={session_id} reason={reason} deleted={} deleted_rows={} inserted={} updated={} duration_ms={}",
                pending.deletes,
                report.deleted_rows,
                pending.inserts,
                pending.updates,
                started_at.elapsed().as_millis()
            );
        }

        buffer.clear();
        report
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    let text = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    sanitize_message(&text, MAX_PANIC_CHARS)
}

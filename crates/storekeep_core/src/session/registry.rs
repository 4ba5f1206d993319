//! Live session table and termination entry points.
//!
//! # Responsibility
//! - Allocate sessions with their buffer and flush coordinator.
//! - Route logout, idle timeout and shutdown into one termination path.
//! - Count failed flushes for operational visibility.
//!
//! # Invariants
//! - Removing a session from the table is what grants the right to flush it,
//!   so each session is flushed at most once even under racing terminations.

use crate::config::CoreConfig;
use crate::flush::{FlushCoordinator, FlushReport};
use crate::model::record::UserId;
use crate::repo::record_store::SharedStore;
use crate::session::{Session, SessionId, TerminationReason};
use log::{info, warn};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct SessionRegistry {
    store: SharedStore,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    flush_failures: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new(store: SharedStore, idle_timeout: Duration) -> Self {
        Self {
            store,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
            flush_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(store: SharedStore, config: &CoreConfig) -> Self {
        Self::new(store, config.idle_timeout())
    }

    /// Store handle sessions flush into; request handlers read through it.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Starts a session for `user` with an empty staging buffer.
    pub fn open_session(&self, user: UserId) -> Arc<Session> {
        let session = Arc::new(Session::new(
            user,
            FlushCoordinator::new(Arc::clone(&self.store)),
        ));
        self.table().insert(session.id(), Arc::clone(&session));
        info!(
            "event=session_open module=session status=ok session_id={} user_id={user}",
            session.id()
        );
        session
    }

    /// Looks up a live session and refreshes its idle clock.
    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        let session = self.table().get(&id).cloned()?;
        session.touch(Instant::now());
        Some(session)
    }

    pub fn active_sessions(&self) -> usize {
        self.table().len()
    }

    /// Process-lifetime count of flushes that ended in failure.
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    /// Ends a session and flushes it on the calling thread.
    ///
    /// Returns `None` when the session is unknown or already terminated.
    pub fn terminate(&self, id: SessionId, reason: TerminationReason) -> Option<FlushReport> {
        let session = self.table().remove(&id)?;
        run_termination(&session, reason, &self.flush_failures)
    }

    /// Ends a session and flushes it on a dedicated thread.
    ///
    /// The session leaves the table before this returns; the flush itself
    /// runs off the caller's thread.
    pub fn terminate_in_background(
        &self,
        id: SessionId,
        reason: TerminationReason,
    ) -> io::Result<Option<JoinHandle<Option<FlushReport>>>> {
        let Some(session) = self.table().remove(&id) else {
            return Ok(None);
        };
        let failures = Arc::clone(&self.flush_failures);
        let spawned = thread::Builder::new()
            .name(format!("session-flush-{id}"))
            .spawn({
                let session = Arc::clone(&session);
                move || run_termination(&session, reason, &failures)
            });

        match spawned {
            Ok(handle) => Ok(Some(handle)),
            Err(err) => {
                warn!(
                    "event=session_terminate module=session status=error session_id={id} error_code=spawn_failed error={err}"
                );
                // Flush inline rather than dropping the buffer unflushed.
                run_termination(&session, reason, &self.flush_failures);
                Err(err)
            }
        }
    }

    /// Terminates every session idle for longer than the configured timeout.
    pub fn expire_idle(&self, now: Instant) -> Vec<FlushReport> {
        let expired: Vec<Arc<Session>> = {
            let mut table = self.table();
            let ids: Vec<SessionId> = table
                .values()
                .filter(|session| session.idle_for(now) > self.idle_timeout)
                .map(|session| session.id())
                .collect();
            ids.iter().filter_map(|id| table.remove(id)).collect()
        };

        expired
            .iter()
            .filter_map(|session| {
                run_termination(session, TerminationReason::IdleTimeout, &self.flush_failures)
            })
            .collect()
    }

    /// Terminates every remaining session.
    pub fn shutdown(&self) -> Vec<FlushReport> {
        let drained: Vec<Arc<Session>> = self.table().drain().map(|(_, s)| s).collect();
        info!(
            "event=registry_shutdown module=session status=start sessions={}",
            drained.len()
        );
        drained
            .iter()
            .filter_map(|session| {
                run_termination(session, TerminationReason::Shutdown, &self.flush_failures)
            })
            .collect()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_termination(
    session: &Session,
    reason: TerminationReason,
    failures: &AtomicU64,
) -> Option<FlushReport> {
    let report = session.terminate(reason)?;
    if !report.is_success() {
        failures.fetch_add(1, Ordering::Relaxed);
    }
    info!(
        "event=session_terminate module=session status=ok session_id={} reason={reason} flushed={}",
        session.id(),
        report.is_success()
    );
    Some(report)
}

//! Session ownership of staging buffers and their termination.
//!
//! # Responsibility
//! - Give each session exactly one staging buffer behind one lock.
//! - Bind the flush coordinator (and its store handle) at session creation.
//! - Run the flush exactly once when the session terminates.
//!
//! # Invariants
//! - Buffer reads take the shared lock, mutations and flush the exclusive one.
//! - Once terminated, a session rejects every buffer access.
//! - Buffers are never shared across sessions.

pub mod registry;

use crate::flush::{FlushCoordinator, FlushReport};
use crate::model::record::UserId;
use crate::staging::buffer::StagingBuffer;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub use registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Logout,
    IdleTimeout,
    Shutdown,
}

impl Display for TerminationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Logout => "logout",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Buffer access on a session that already terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed(pub SessionId);

impl Display for SessionClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "session {} has already ended", self.0)
    }
}

impl Error for SessionClosed {}

#[derive(Debug, Default)]
struct SessionState {
    buffer: StagingBuffer,
    closed: bool,
}

/// One user session and its staging buffer.
pub struct Session {
    id: SessionId,
    user: UserId,
    state: RwLock<SessionState>,
    last_active: Mutex<Instant>,
    flusher: FlushCoordinator,
}

impl Session {
    pub(crate) fn new(user: UserId, flusher: FlushCoordinator) -> Self {
        Self {
            id: SessionId::new(),
            user,
            state: RwLock::new(SessionState::default()),
            last_active: Mutex::new(Instant::now()),
            flusher,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Principal the session was opened for.
    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn is_closed(&self) -> bool {
        self.read_state().closed
    }

    /// Runs `f` with shared access to the buffer.
    pub fn read<T>(&self, f: impl FnOnce(&StagingBuffer) -> T) -> Result<T, SessionClosed> {
        let state = self.read_state();
        if state.closed {
            return Err(SessionClosed(self.id));
        }
        Ok(f(&state.buffer))
    }

    /// Runs `f` with exclusive access to the buffer.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut StagingBuffer) -> T) -> Result<T, SessionClosed> {
        let mut state = self.write_state();
        if state.closed {
            return Err(SessionClosed(self.id));
        }
        Ok(f(&mut state.buffer))
    }

    /// Flushes and closes the session. Returns `None` if it was already closed.
    ///
    /// Waits for in-flight mutations, since it needs the exclusive lock.
    pub(crate) fn terminate(&self, reason: TerminationReason) -> Option<FlushReport> {
        let mut state = self.write_state();
        if state.closed {
            return None;
        }
        state.closed = true;
        Some(self.flusher.flush(self.id, reason, &mut state.buffer))
    }

    pub(crate) fn touch(&self, now: Instant) {
        *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        let last = *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }

    // A panicking request must not wedge the session or skip its flush.
    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

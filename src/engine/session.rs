// src/engine/session.rs

//! Session bookkeeping for build engines.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::engine::{BuildEngine, PendingBuild};
use crate::errors::SessionError;

/// Public view of an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub concurrency_limit: usize,
    pub active: bool,
}

#[derive(Debug)]
struct ActiveSession {
    generation: u64,
    concurrency_limit: usize,
    outstanding: usize,
    next_id: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    active: Option<ActiveSession>,
    generations: u64,
    ended: u64,
}

/// State machine enforcing the session contract:
///
/// - only one session at a time,
/// - limits must be >= 1,
/// - submissions require an active session,
/// - ending a session with outstanding submissions reports
///   [`SessionError::UnflushedWork`] (the session is closed regardless).
///
/// Completions are matched to their session generation, so a late
/// completion from an aborted session never touches the next one.
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, concurrency_limit: usize) -> Result<(), SessionError> {
        if concurrency_limit < 1 {
            return Err(SessionError::InvalidConcurrencyLimit(concurrency_limit));
        }

        let mut state = self.lock();
        if state.active.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }

        state.generations += 1;
        let generation = state.generations;
        state.active = Some(ActiveSession {
            generation,
            concurrency_limit,
            outstanding: 0,
            next_id: 0,
        });

        info!(session = generation, limit = concurrency_limit, "build session started");
        Ok(())
    }

    /// Register a new submission in the active session.
    pub fn submit(&self) -> Result<PendingBuild, SessionError> {
        let mut state = self.lock();
        let session = state.active.as_mut().ok_or(SessionError::NoActiveSession)?;

        session.outstanding += 1;
        session.next_id += 1;

        Ok(PendingBuild {
            session: session.generation,
            id: session.next_id,
        })
    }

    /// Mark a submission as finished.
    pub fn complete(&self, pending: PendingBuild) {
        let mut state = self.lock();
        match state.active.as_mut() {
            Some(session) if session.generation == pending.session => {
                session.outstanding = session.outstanding.saturating_sub(1);
            }
            _ => {
                debug!(
                    session = pending.session,
                    id = pending.id,
                    "completion arrived after its session ended"
                );
            }
        }
    }

    pub fn end(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        let session = state.active.take().ok_or(SessionError::NoActiveSession)?;
        state.ended += 1;

        if session.outstanding > 0 {
            warn!(
                session = session.generation,
                outstanding = session.outstanding,
                "build session ended with unflushed work"
            );
            return Err(SessionError::UnflushedWork {
                outstanding: session.outstanding,
            });
        }

        info!(session = session.generation, "build session ended");
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.lock().active.as_ref().map(|s| Session {
            concurrency_limit: s.concurrency_limit,
            active: true,
        })
    }

    pub fn outstanding(&self) -> usize {
        self.lock().active.as_ref().map_or(0, |s| s.outstanding)
    }

    /// Number of sessions begun over the tracker's lifetime.
    pub fn sessions_begun(&self) -> u64 {
        self.lock().generations
    }

    pub fn sessions_ended(&self) -> u64 {
        self.lock().ended
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of an engine session.
///
/// [`SessionGuard::end`] ends the session and surfaces the engine's answer.
/// A guard dropped without `end` (early return, abort, timeout) still ends
/// the session, logging rather than returning any error, so
/// `end_session` runs exactly once per `begin_session`.
pub struct SessionGuard<'a, E: BuildEngine + ?Sized> {
    engine: &'a E,
    open: bool,
}

impl<'a, E: BuildEngine + ?Sized> SessionGuard<'a, E> {
    pub fn begin(engine: &'a E, concurrency_limit: usize) -> Result<Self, SessionError> {
        engine.begin_session(concurrency_limit)?;
        Ok(Self { engine, open: true })
    }

    pub fn end(mut self) -> Result<(), SessionError> {
        self.open = false;
        self.engine.end_session()
    }

    /// Best-effort end used on abort paths, where outstanding work is
    /// expected.
    pub fn release(mut self) {
        self.open = false;
        if let Err(e) = self.engine.end_session() {
            warn!(error = %e, "releasing build session after abort");
        }
    }
}

impl<E: BuildEngine + ?Sized> Drop for SessionGuard<'_, E> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.engine.end_session() {
                warn!(error = %e, "ending build session on drop");
            }
        }
    }
}

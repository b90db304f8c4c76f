// src/engine/mod.rs

//! Build engine abstraction.
//!
//! The scheduler never runs builds itself. It talks to a [`BuildEngine`],
//! which accepts a (project, target) pair inside a session and eventually
//! reports an outcome. Production uses [`ProcessBuildEngine`], which spawns
//! the configured build tool once per request; tests plug in a fake engine
//! that completes requests on command.
//!
//! - [`session`] holds the session state machine shared by engine
//!   implementations and the RAII guard the scheduler uses.
//! - [`process`] is the external-process engine.

use std::future::Future;
use std::pin::Pin;

use crate::batch::{BuildOutcome, BuildRequest};
use crate::errors::{EngineFailure, SessionError, SubmitError};

pub mod process;
pub mod session;

pub use process::{CommandTemplate, ProcessBuildEngine};
pub use session::{Session, SessionGuard, SessionTracker};

/// What an engine reports for one request: an outcome (which may itself be
/// a failed build), or a failure of the engine itself.
pub type EngineResult = std::result::Result<BuildOutcome, EngineFailure>;

/// Invoked exactly once when an asynchronously submitted request finishes.
///
/// May run on any thread.
pub type CompletionCallback = Box<dyn FnOnce(EngineResult) + Send + 'static>;

pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handle for a submission that has not reported back yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingBuild {
    /// Session generation the submission belongs to.
    pub session: u64,
    pub id: u64,
}

/// Trait abstracting the external build engine.
///
/// At most one session may be active at a time. Submissions are only valid
/// inside a session, and every submission must eventually complete (or the
/// engine must report an [`EngineFailure`]) before the session is ended.
pub trait BuildEngine: Send + Sync {
    /// Open a session allowing `concurrency_limit` simultaneous builds.
    fn begin_session(&self, concurrency_limit: usize) -> Result<(), SessionError>;

    /// Submit a request without waiting for it; `on_complete` receives the
    /// result once the engine is done with it.
    fn submit_async(
        &self,
        request: BuildRequest,
        on_complete: CompletionCallback,
    ) -> Result<PendingBuild, SubmitError>;

    /// Submit a request and wait for its outcome.
    fn submit_sync(&self, request: BuildRequest)
    -> EngineFuture<'_, Result<BuildOutcome, SubmitError>>;

    /// Close the active session.
    fn end_session(&self) -> Result<(), SessionError>;

    /// Snapshot of the active session, if any.
    fn session(&self) -> Option<Session>;
}

// src/errors.rs

//! Crate-wide error types.
//!
//! Usage errors (bad concurrency limit, overlapping sessions) and systemic
//! engine failures get their own structured types so the scheduler can tell
//! them apart from a project that simply failed to build. A failed project
//! is not an error at all: it is a [`BuildStatus::Failed`] outcome.
//!
//! [`BuildStatus::Failed`]: crate::batch::BuildStatus::Failed

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::batch::BatchResult;

/// Violations of the engine session contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a build session is already active on this engine")]
    SessionAlreadyActive,

    #[error("concurrency limit must be >= 1 (got {0})")]
    InvalidConcurrencyLimit(usize),

    #[error("no build session is active on this engine")]
    NoActiveSession,

    /// The session was closed while submissions had no outcome yet.
    #[error("session ended with {outstanding} outstanding submission(s)")]
    UnflushedWork { outstanding: usize },
}

/// The engine itself crashed or could not be reached.
///
/// This is distinct from a project failing to build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("build engine failure while building {}: {message}", project.display())]
pub struct EngineFailure {
    pub project: PathBuf,
    pub message: String,
}

impl EngineFailure {
    pub fn new(project: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            message: message.into(),
        }
    }
}

/// Why an engine refused a submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Engine(#[from] EngineFailure),
}

/// Errors raised by [`crate::batch::ResultCollector`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("result collector expected {expected} outcome(s) but received more")]
    Overflow { expected: usize },

    #[error(transparent)]
    Faulted(#[from] EngineFailure),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Systemic engine failure; `partial` holds everything recorded before
    /// the abort, with unfinished requests marked `Aborted`.
    #[error("scheduler aborted: {reason}")]
    SchedulerAborted {
        reason: EngineFailure,
        partial: BatchResult,
    },

    #[error("batch timed out after {timeout:?}")]
    BatchTimedOut {
        timeout: Duration,
        partial: BatchResult,
    },

    #[error("result collector overflow: expected {expected} outcome(s)")]
    CollectorOverflow { expected: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// Partial results attached to an aborted or timed-out batch.
    pub fn partial_result(&self) -> Option<&BatchResult> {
        match self {
            BatchError::SchedulerAborted { partial, .. }
            | BatchError::BatchTimedOut { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchError>;

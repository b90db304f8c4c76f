// src/report/mod.rs

//! Build progress reporting.
//!
//! Reporters are passed to the scheduler and the engine at construction and
//! receive, per request, `ProjectStarted`, then any number of
//! `TargetStarted` / `Diagnostic` events, then `ProjectFinished`. What a
//! reporter chooses to display has no effect on scheduling.

use std::path::PathBuf;

use crate::batch::BuildStatus;

pub mod console;
pub mod diagnostic;

pub use console::ConsoleReporter;
pub use diagnostic::{Diagnostic, Severity};

/// Lifecycle events for one build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    ProjectStarted {
        project: PathBuf,
        target: String,
    },
    TargetStarted {
        project: PathBuf,
        target: String,
    },
    Diagnostic {
        project: PathBuf,
        diagnostic: Diagnostic,
    },
    ProjectFinished {
        project: PathBuf,
        target: String,
        status: BuildStatus,
    },
}

impl BuildEvent {
    pub fn project(&self) -> &PathBuf {
        match self {
            BuildEvent::ProjectStarted { project, .. }
            | BuildEvent::TargetStarted { project, .. }
            | BuildEvent::Diagnostic { project, .. }
            | BuildEvent::ProjectFinished { project, .. } => project,
        }
    }
}

/// Receives build lifecycle events. Called from arbitrary threads.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &BuildEvent);
}

/// Reporter that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _event: &BuildEvent) {}
}

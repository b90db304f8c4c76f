// src/batch/outcome.rs

//! Terminal results of build requests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::batch::request::BuildRequest;

/// Terminal status of one build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Succeeded,
    Failed,
    /// Never finished: the batch was aborted or timed out first.
    Aborted,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Succeeded => "Success",
            BuildStatus::Failed => "Failure",
            BuildStatus::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// Outcome of exactly one submitted [`BuildRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub project: PathBuf,
    pub target: String,
    pub status: BuildStatus,
    pub error_detail: Option<String>,
    /// When the outcome was produced; the only source of completion order.
    pub completed_at: Instant,
}

impl BuildOutcome {
    pub fn succeeded(request: &BuildRequest) -> Self {
        Self::with_status(request, BuildStatus::Succeeded, None)
    }

    pub fn failed(request: &BuildRequest, detail: impl Into<String>) -> Self {
        Self::with_status(request, BuildStatus::Failed, Some(detail.into()))
    }

    pub fn aborted(request: &BuildRequest, detail: impl Into<String>) -> Self {
        Self::with_status(request, BuildStatus::Aborted, Some(detail.into()))
    }

    fn with_status(request: &BuildRequest, status: BuildStatus, error_detail: Option<String>) -> Self {
        Self {
            project: request.project().to_path_buf(),
            target: request.target().to_string(),
            status,
            error_detail,
            completed_at: Instant::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }
}

/// Outcomes of a batch, one per request, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    outcomes: Vec<BuildOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<BuildOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildOutcome> {
        self.outcomes.iter()
    }

    pub fn outcomes(&self) -> &[BuildOutcome] {
        &self.outcomes
    }

    /// Status of the first outcome recorded for `project`.
    pub fn status_of(&self, project: &Path) -> Option<BuildStatus> {
        self.outcomes
            .iter()
            .find(|o| o.project == project)
            .map(|o| o.status)
    }

    pub fn count(&self, status: BuildStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(BuildOutcome::is_success)
    }

    /// Outcomes re-sorted by their completion timestamps.
    pub fn in_completion_order(&self) -> Vec<&BuildOutcome> {
        let mut sorted: Vec<&BuildOutcome> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.completed_at);
        sorted
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a BuildOutcome;
    type IntoIter = std::slice::Iter<'a, BuildOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

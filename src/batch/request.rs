// src/batch/request.rs

//! Immutable description of one unit of build work.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global properties shared by every request of a batch.
///
/// Read-only for the lifetime of the batch, so concurrent builds share one
/// allocation instead of copying the map per request.
pub type SharedProperties = Arc<BTreeMap<String, String>>;

/// One (project, target) pair to hand to the build engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    project: PathBuf,
    target: String,
    properties: SharedProperties,
}

impl BuildRequest {
    pub fn new(
        project: impl Into<PathBuf>,
        target: impl Into<String>,
        properties: SharedProperties,
    ) -> Self {
        Self {
            project: project.into(),
            target: target.into(),
            properties,
        }
    }

    /// Request with an empty property set (handy in tests and one-offs).
    pub fn without_properties(project: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self::new(project, target, SharedProperties::default())
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn properties(&self) -> &SharedProperties {
        &self.properties
    }
}

impl fmt::Display for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.project.display(), self.target)
    }
}

/// Build one request per `(project, target)` pair, all sharing `properties`.
pub fn requests_for<P, T>(
    pairs: impl IntoIterator<Item = (P, T)>,
    properties: &SharedProperties,
) -> Vec<BuildRequest>
where
    P: Into<PathBuf>,
    T: Into<String>,
{
    pairs
        .into_iter()
        .map(|(project, target)| BuildRequest::new(project, target, Arc::clone(properties)))
        .collect()
}

use std::path::PathBuf;
use std::sync::Mutex;

use batchbuild::batch::BuildStatus;
use batchbuild::report::{BuildEvent, ProgressReporter};

/// Reporter that keeps every event it receives, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events concerning `project`, in arrival order.
    pub fn events_for(&self, project: &str) -> Vec<BuildEvent> {
        let project = PathBuf::from(project);
        self.events()
            .into_iter()
            .filter(|e| *e.project() == project)
            .collect()
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::ProjectStarted { project, .. } => Some(project),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(PathBuf, BuildStatus)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::ProjectFinished {
                    project, status, ..
                } => Some((project, status)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: &BuildEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

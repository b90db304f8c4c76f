// src/report/console.rs

//! Human-readable console rendering of build events.

use tracing::trace;

use crate::report::{BuildEvent, Diagnostic, ProgressReporter, Severity};
use crate::types::Verbosity;

/// Prints build events to stdout, filtered by [`Verbosity`].
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// The line printed for `event`, or `None` if it is filtered out.
    pub fn render(&self, event: &BuildEvent) -> Option<String> {
        match event {
            BuildEvent::ProjectStarted { project, .. } => {
                Some(format!("Project Started: {}", project.display()))
            }
            BuildEvent::ProjectFinished { project, .. } => {
                Some(format!("Project Finished: {}", project.display()))
            }
            BuildEvent::TargetStarted { target, .. } => (self.verbosity >= Verbosity::Detailed)
                .then(|| format!("Target Started: {target}")),
            BuildEvent::Diagnostic { diagnostic, .. } => match diagnostic.severity {
                Severity::Message(importance) if self.verbosity < importance.min_verbosity() => None,
                _ => Some(render_diagnostic(diagnostic)),
            },
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: &BuildEvent) {
        match self.render(event) {
            Some(line) => println!("{line}"),
            None => trace!(project = %event.project().display(), "event filtered by verbosity"),
        }
    }
}

fn render_diagnostic(d: &Diagnostic) -> String {
    let location = || {
        format!(
            "{}({},{})",
            d.file.as_deref().unwrap_or_default(),
            d.line,
            d.column
        )
    };
    let head = match d.severity {
        Severity::Error => format!(": ERROR {}: ", location()),
        Severity::Warning => format!(": Warning {}: ", location()),
        Severity::Message(_) => String::new(),
    };

    // Engine-originated lines read better without the sender prefix.
    match d.sender.as_deref() {
        Some(sender) if !sender.eq_ignore_ascii_case("msbuild") => {
            format!("{sender}: {head}{}", d.message)
        }
        _ => format!("{head}{}", d.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BuildStatus;
    use crate::types::Importance;
    use std::path::PathBuf;

    fn diag(severity: Severity) -> BuildEvent {
        BuildEvent::Diagnostic {
            project: PathBuf::from("/p/App.csproj"),
            diagnostic: Diagnostic {
                severity,
                sender: Some("Csc".to_string()),
                file: Some("Program.cs".to_string()),
                line: 4,
                column: 9,
                code: Some("CS0103".to_string()),
                message: "name does not exist".to_string(),
            },
        }
    }

    #[test]
    fn errors_and_warnings_use_location_format() {
        let r = ConsoleReporter::new(Verbosity::Normal);
        assert_eq!(
            r.render(&diag(Severity::Error)).unwrap(),
            "Csc: : ERROR Program.cs(4,9): name does not exist"
        );
        assert_eq!(
            r.render(&diag(Severity::Warning)).unwrap(),
            "Csc: : Warning Program.cs(4,9): name does not exist"
        );
    }

    #[test]
    fn msbuild_sender_is_omitted() {
        let r = ConsoleReporter::new(Verbosity::Normal);
        let event = BuildEvent::Diagnostic {
            project: PathBuf::from("/p"),
            diagnostic: Diagnostic::message(Importance::High, "Build started.").with_sender("MSBuild"),
        };
        assert_eq!(r.render(&event).unwrap(), "Build started.");
    }

    #[test]
    fn message_importance_is_filtered_by_verbosity() {
        let low = BuildEvent::Diagnostic {
            project: PathBuf::from("/p"),
            diagnostic: Diagnostic::message(Importance::Low, "copying files"),
        };
        assert!(ConsoleReporter::new(Verbosity::Normal).render(&low).is_none());
        assert!(ConsoleReporter::new(Verbosity::Detailed).render(&low).is_some());
    }

    #[test]
    fn target_started_only_when_detailed() {
        let event = BuildEvent::TargetStarted {
            project: PathBuf::from("/p"),
            target: "Build".to_string(),
        };
        assert!(ConsoleReporter::new(Verbosity::Normal).render(&event).is_none());
        assert_eq!(
            ConsoleReporter::new(Verbosity::Diagnostic).render(&event).unwrap(),
            "Target Started: Build"
        );
    }

    #[test]
    fn quiet_keeps_project_lines_and_diagnostics() {
        let r = ConsoleReporter::new(Verbosity::Quiet);
        let finished = BuildEvent::ProjectFinished {
            project: PathBuf::from("/p"),
            target: "Build".to_string(),
            status: BuildStatus::Succeeded,
        };
        let high = BuildEvent::Diagnostic {
            project: PathBuf::from("/p"),
            diagnostic: Diagnostic::message(Importance::High, "Build started."),
        };
        assert_eq!(r.render(&finished).as_deref(), Some("Project Finished: /p"));
        assert!(r.render(&diag(Severity::Warning)).is_some());
        assert!(r.render(&diag(Severity::Error)).is_some());
        assert!(r.render(&high).is_none());
    }
}

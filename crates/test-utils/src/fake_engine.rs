use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchbuild::batch::{BuildOutcome, BuildRequest, BuildStatus};
use batchbuild::engine::{
    BuildEngine, CompletionCallback, EngineFuture, EngineResult, PendingBuild, Session,
    SessionTracker,
};
use batchbuild::errors::{EngineFailure, SessionError, SubmitError};
use batchbuild::report::{BuildEvent, Diagnostic, ProgressReporter};

/// Scripted behaviour for one project.
#[derive(Debug, Clone)]
struct Script {
    status: BuildStatus,
    delay: Option<Duration>,
    /// Report an engine failure through the completion callback.
    crash: bool,
    /// Refuse the submission itself.
    unreachable: bool,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status: BuildStatus::Succeeded,
            delay: None,
            crash: false,
            unreachable: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Counters and logs shared with in-flight fake builds.
#[derive(Debug, Default)]
struct Stats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    begins: AtomicUsize,
    ends: AtomicUsize,
    submitted: Mutex<Vec<PathBuf>>,
    completed: Mutex<Vec<PathBuf>>,
}

impl Stats {
    fn started(&self, project: &Path) {
        self.submitted.lock().unwrap().push(project.to_path_buf());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn finished(&self, project: &Path) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(project.to_path_buf());
    }
}

/// A controllable engine for scheduler tests.
///
/// - every project succeeds after `default_delay` unless scripted otherwise
/// - async submissions complete on a spawned tokio task
/// - `in_flight` is decremented before the completion callback runs, so
///   `max_in_flight` is exact with respect to the scheduler's permits
pub struct FakeEngine {
    sessions: Arc<SessionTracker>,
    scripts: HashMap<PathBuf, Script>,
    default_delay: Duration,
    reporter: Option<Arc<dyn ProgressReporter>>,
    stats: Arc<Stats>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(SessionTracker::new()),
            scripts: HashMap::new(),
            default_delay: Duration::from_millis(5),
            reporter: None,
            stats: Arc::new(Stats::default()),
        }
    }

    fn script(&mut self, project: &str) -> &mut Script {
        self.scripts.entry(PathBuf::from(project)).or_default()
    }

    pub fn with_status(mut self, project: &str, status: BuildStatus) -> Self {
        self.script(project).status = status;
        self
    }

    pub fn with_delay(mut self, project: &str, delay: Duration) -> Self {
        self.script(project).delay = Some(delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// The build of `project` ends in an engine failure.
    pub fn crash_on(mut self, project: &str) -> Self {
        self.script(project).crash = true;
        self
    }

    /// Submitting `project` fails immediately, as if the engine were gone.
    pub fn unreachable_on(mut self, project: &str) -> Self {
        self.script(project).unreachable = true;
        self
    }

    /// Emit `diagnostic` while building `project` (needs a reporter).
    pub fn with_diagnostic(mut self, project: &str, diagnostic: Diagnostic) -> Self {
        self.script(project).diagnostics.push(diagnostic);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    /// Successful `begin_session` calls.
    pub fn begin_count(&self) -> usize {
        self.stats.begins.load(Ordering::SeqCst)
    }

    /// `end_session` calls made while a session was open.
    pub fn end_count(&self) -> usize {
        self.stats.ends.load(Ordering::SeqCst)
    }

    /// Projects in submission order.
    pub fn submissions(&self) -> Vec<PathBuf> {
        self.stats.submitted.lock().unwrap().clone()
    }

    /// Projects in completion order.
    pub fn completions(&self) -> Vec<PathBuf> {
        self.stats.completed.lock().unwrap().clone()
    }

    fn prepare(&self, request: &BuildRequest) -> Result<(FakeBuild, PendingBuild), SubmitError> {
        let script = self
            .scripts
            .get(request.project())
            .cloned()
            .unwrap_or_default();

        if script.unreachable {
            return Err(EngineFailure::new(request.project(), "build engine unreachable").into());
        }

        let pending = self.sessions.submit()?;
        self.stats.started(request.project());

        let build = FakeBuild {
            request: request.clone(),
            delay: script.delay.unwrap_or(self.default_delay),
            script,
            reporter: self.reporter.clone(),
        };
        Ok((build, pending))
    }
}

struct FakeBuild {
    request: BuildRequest,
    script: Script,
    delay: Duration,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl FakeBuild {
    async fn run(self) -> EngineResult {
        if let Some(reporter) = &self.reporter {
            reporter.report(&BuildEvent::TargetStarted {
                project: self.request.project().to_path_buf(),
                target: self.request.target().to_string(),
            });
            for diagnostic in &self.script.diagnostics {
                reporter.report(&BuildEvent::Diagnostic {
                    project: self.request.project().to_path_buf(),
                    diagnostic: diagnostic.clone(),
                });
            }
        }

        tokio::time::sleep(self.delay).await;

        if self.script.crash {
            return Err(EngineFailure::new(
                self.request.project(),
                "simulated engine crash",
            ));
        }

        Ok(match self.script.status {
            BuildStatus::Succeeded => BuildOutcome::succeeded(&self.request),
            BuildStatus::Failed => BuildOutcome::failed(&self.request, "exit code 1"),
            BuildStatus::Aborted => BuildOutcome::aborted(&self.request, "scripted abort"),
        })
    }
}

impl BuildEngine for FakeEngine {
    fn begin_session(&self, concurrency_limit: usize) -> Result<(), SessionError> {
        self.sessions.begin(concurrency_limit)?;
        self.stats.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit_async(
        &self,
        request: BuildRequest,
        on_complete: CompletionCallback,
    ) -> Result<PendingBuild, SubmitError> {
        let (build, pending) = self.prepare(&request)?;
        let sessions = Arc::clone(&self.sessions);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let result = build.run().await;
            stats.finished(request.project());
            sessions.complete(pending);
            on_complete(result);
        });

        Ok(pending)
    }

    fn submit_sync(
        &self,
        request: BuildRequest,
    ) -> EngineFuture<'_, Result<BuildOutcome, SubmitError>> {
        Box::pin(async move {
            let (build, pending) = self.prepare(&request)?;
            let result = build.run().await;
            self.stats.finished(request.project());
            self.sessions.complete(pending);
            Ok::<_, SubmitError>(result?)
        })
    }

    fn end_session(&self) -> Result<(), SessionError> {
        let result = self.sessions.end();
        if !matches!(result, Err(SessionError::NoActiveSession)) {
            self.stats.ends.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    fn session(&self) -> Option<Session> {
        self.sessions.current()
    }
}

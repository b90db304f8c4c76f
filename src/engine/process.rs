// src/engine/process.rs

//! Build engine that runs an external build tool once per request.
//!
//! Each request becomes one child process built from a [`CommandTemplate`]
//! (for example `dotnet msbuild {project} -target:{target}`). Stdout and
//! stderr are parsed line by line into diagnostics for the reporter; the
//! exit status decides between `Succeeded` and `Failed`. Failing to launch
//! or wait on the tool is an engine failure, not a project failure.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::batch::{BuildOutcome, BuildRequest};
use crate::engine::session::{Session, SessionTracker};
use crate::engine::{
    BuildEngine, CompletionCallback, EngineFuture, EngineResult, PendingBuild,
};
use crate::errors::{EngineFailure, SessionError, SubmitError};
use crate::report::{BuildEvent, Diagnostic, ProgressReporter};
use crate::types::Importance;

/// How to turn a request into a command line.
///
/// `args` may contain `{project}` and `{target}`; `property_arg` is
/// appended once per shared property with `{key}` and `{value}` filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub property_arg: String,
    pub env: BTreeMap<String, String>,
}

impl CommandTemplate {
    /// Fully expanded argument list for `request`.
    pub fn render_args(&self, request: &BuildRequest) -> Vec<String> {
        let project = request.project().display().to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{project}", &project)
                    .replace("{target}", request.target())
            })
            .collect();

        for (key, value) in request.properties().iter() {
            args.push(
                self.property_arg
                    .replace("{key}", key)
                    .replace("{value}", value),
            );
        }
        args
    }

    fn command(&self, request: &BuildRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(request))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Production engine: one child process per request.
///
/// The session's concurrency limit doubles as the engine's node count: a
/// per-session worker pool caps how many tool processes run at once.
/// Ending a session aborts its spawned builds, which kills their children.
pub struct ProcessBuildEngine {
    template: Arc<CommandTemplate>,
    reporter: Arc<dyn ProgressReporter>,
    sessions: Arc<SessionTracker>,
    active: Mutex<Option<SessionWork>>,
}

/// Resources owned by the active session.
struct SessionWork {
    workers: Arc<Semaphore>,
    builds: Vec<AbortHandle>,
}

impl SessionWork {
    fn shut_down(self) {
        // Builds still queued for a node give up instead of starting.
        self.workers.close();
        let running = self.builds.iter().filter(|b| !b.is_finished()).count();
        if running > 0 {
            warn!(running, "aborting builds of ended session");
        }
        for build in self.builds {
            build.abort();
        }
    }
}

impl ProcessBuildEngine {
    pub fn new(template: CommandTemplate, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            template: Arc::new(template),
            reporter,
            sessions: Arc::new(SessionTracker::new()),
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<SessionWork>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn worker_pool(&self) -> Result<Arc<Semaphore>, SessionError> {
        self.lock_active()
            .as_ref()
            .map(|work| Arc::clone(&work.workers))
            .ok_or(SessionError::NoActiveSession)
    }

    /// Everything a spawned build needs, detached from `&self`.
    fn job(&self, request: BuildRequest) -> Result<BuildJob, SessionError> {
        let workers = self.worker_pool()?;
        let pending = self.sessions.submit()?;
        Ok(BuildJob {
            request,
            pending,
            workers,
            template: Arc::clone(&self.template),
            reporter: Arc::clone(&self.reporter),
            sessions: Arc::clone(&self.sessions),
        })
    }
}

impl BuildEngine for ProcessBuildEngine {
    fn begin_session(&self, concurrency_limit: usize) -> Result<(), SessionError> {
        self.sessions.begin(concurrency_limit)?;
        *self.lock_active() = Some(SessionWork {
            workers: Arc::new(Semaphore::new(concurrency_limit)),
            builds: Vec::new(),
        });
        Ok(())
    }

    fn submit_async(
        &self,
        request: BuildRequest,
        on_complete: CompletionCallback,
    ) -> Result<PendingBuild, SubmitError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            EngineFailure::new(request.project(), format!("no async runtime to run builds on: {e}"))
        })?;
        let job = self.job(request)?;
        let pending = job.pending;

        let mut active = self.lock_active();
        let Some(work) = active.as_mut() else {
            return Err(SessionError::NoActiveSession.into());
        };
        let build = runtime.spawn(async move {
            let result = job.run().await;
            on_complete(result);
        });
        work.builds.retain(|b| !b.is_finished());
        work.builds.push(build.abort_handle());

        Ok(pending)
    }

    fn submit_sync(
        &self,
        request: BuildRequest,
    ) -> EngineFuture<'_, Result<BuildOutcome, SubmitError>> {
        Box::pin(async move {
            let job = self.job(request)?;
            let outcome = job.run().await?;
            Ok::<_, SubmitError>(outcome)
        })
    }

    fn end_session(&self) -> Result<(), SessionError> {
        let result = self.sessions.end();
        let work = self.lock_active().take();
        if let Some(work) = work {
            work.shut_down();
        }
        result
    }

    fn session(&self) -> Option<Session> {
        self.sessions.current()
    }
}

struct BuildJob {
    request: BuildRequest,
    pending: PendingBuild,
    workers: Arc<Semaphore>,
    template: Arc<CommandTemplate>,
    reporter: Arc<dyn ProgressReporter>,
    sessions: Arc<SessionTracker>,
}

impl BuildJob {
    /// Wait for a node, run the tool, and release the submission.
    async fn run(self) -> EngineResult {
        let result = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(_node) => self.execute().await,
            Err(_) => Err(EngineFailure::new(
                self.request.project(),
                "build session ended before a node became available",
            )),
        };
        self.sessions.complete(self.pending);
        result
    }

    async fn execute(&self) -> EngineResult {
        let request = &self.request;
        match run_tool(&self.template, request, self.reporter.as_ref()).await {
            Ok(Ok(())) => Ok(BuildOutcome::succeeded(request)),
            Ok(Err(detail)) => Ok(BuildOutcome::failed(request, detail)),
            Err(e) => Err(EngineFailure::new(request.project(), format!("{e:#}"))),
        }
    }
}

/// Run the build tool for one request.
///
/// The outer `Result` is an engine failure (spawn/wait errors); the inner one
/// carries the failure detail of a build that ran but did not succeed.
async fn run_tool(
    template: &CommandTemplate,
    request: &BuildRequest,
    reporter: &dyn ProgressReporter,
) -> Result<std::result::Result<(), String>> {
    info!(
        project = %request.project().display(),
        target = %request.target(),
        program = %template.program,
        "starting build process"
    );

    let mut child = template
        .command(request)
        .spawn()
        .with_context(|| format!("launching build tool '{}'", template.program))?;

    reporter.report(&BuildEvent::TargetStarted {
        project: request.project().to_path_buf(),
        target: request.target().to_string(),
    });

    // Drain both pipes concurrently with the wait so the child never blocks
    // on a full buffer; all diagnostics are reported before we return.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, (), ()) = tokio::join!(
        child.wait(),
        pump_lines(stdout, request, reporter, Importance::Normal),
        pump_lines(stderr, request, reporter, Importance::High),
    );

    let status = status.with_context(|| {
        format!(
            "waiting for build tool of project '{}'",
            request.project().display()
        )
    })?;

    info!(
        project = %request.project().display(),
        target = %request.target(),
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "build process exited"
    );

    if status.success() {
        Ok(Ok(()))
    } else {
        Ok(Err(match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "build tool terminated by signal".to_string(),
        }))
    }
}

async fn pump_lines<R>(
    stream: Option<R>,
    request: &BuildRequest,
    reporter: &dyn ProgressReporter,
    importance: Importance,
) where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };

    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                debug!(project = %request.project().display(), "tool output: {}", line);
                reporter.report(&BuildEvent::Diagnostic {
                    project: request.project().to_path_buf(),
                    diagnostic: Diagnostic::parse_line(&line, importance),
                });
            }
            Ok(None) => break,
            Err(e) => {
                warn!(
                    project = %request.project().display(),
                    error = %e,
                    "failed reading build tool output"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn render_args_fills_placeholders_and_properties() {
        let template = CommandTemplate {
            program: "dotnet".to_string(),
            args: vec![
                "msbuild".to_string(),
                "{project}".to_string(),
                "-target:{target}".to_string(),
            ],
            property_arg: "-property:{key}={value}".to_string(),
            env: BTreeMap::new(),
        };
        let props = Arc::new(BTreeMap::from([
            ("Configuration".to_string(), "Release".to_string()),
            ("Platform".to_string(), "x64".to_string()),
        ]));
        let request = BuildRequest::new(Path::new("/src/App.csproj"), "Restore", props);

        assert_eq!(
            template.render_args(&request),
            vec![
                "msbuild",
                "/src/App.csproj",
                "-target:Restore",
                "-property:Configuration=Release",
                "-property:Platform=x64",
            ]
        );
    }
}

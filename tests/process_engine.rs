// tests/process_engine.rs

#![cfg(unix)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use batchbuild::batch::{BatchScheduler, BuildRequest, BuildStatus, SchedulerOptions};
use batchbuild::engine::{BuildEngine, CommandTemplate, ProcessBuildEngine};
use batchbuild::errors::BatchError;
use batchbuild::report::{BuildEvent, Severity};
use batchbuild_test_utils::{RecordingReporter, init_tracing, with_timeout};
use tempfile::tempdir;

/// `sh -c SCRIPT project target property`: prints one canonical warning and
/// one plain line, and fails with exit code 3 unless the target is `Build`.
const SCRIPT: &str = r#"echo "$0(3,5): warning CS0168: The variable 'x' is declared but never used"
echo "building $1 with $2"
[ "$1" = Build ] || exit 3"#;

fn sh_template() -> CommandTemplate {
    CommandTemplate {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            SCRIPT.to_string(),
            "{project}".to_string(),
            "{target}".to_string(),
        ],
        property_arg: "{key}={value}".to_string(),
        env: BTreeMap::new(),
    }
}

fn request(project: &str, target: &str) -> BuildRequest {
    let mut props = BTreeMap::new();
    props.insert("Configuration".to_string(), "Debug".to_string());
    BuildRequest::new(project, target, Arc::new(props))
}

fn engine(reporter: Arc<RecordingReporter>) -> Arc<ProcessBuildEngine> {
    Arc::new(ProcessBuildEngine::new(sh_template(), reporter))
}

#[tokio::test]
async fn exit_status_decides_outcome() {
    init_tracing();
    let reporter = Arc::new(RecordingReporter::new());
    let s = BatchScheduler::new(engine(reporter.clone()), reporter.clone());

    let result = with_timeout(s.run_batch(
        vec![
            request("/demo/A.csproj", "Build"),
            request("/demo/B.csproj", "Publish"),
        ],
        2,
    ))
    .await
    .unwrap();

    assert_eq!(
        result.status_of(Path::new("/demo/A.csproj")),
        Some(BuildStatus::Succeeded)
    );
    let failed = &result.outcomes()[1];
    assert_eq!(failed.status, BuildStatus::Failed);
    assert_eq!(failed.error_detail.as_deref(), Some("exit code 3"));
    assert!(s.engine().session().is_none());
}

#[tokio::test]
async fn output_lines_become_diagnostics() {
    let reporter = Arc::new(RecordingReporter::new());
    let s = BatchScheduler::new(engine(reporter.clone()), reporter.clone());

    with_timeout(s.run_batch(vec![request("/demo/A.csproj", "Build")], 1))
        .await
        .unwrap();

    let diagnostics: Vec<_> = reporter
        .events_for("/demo/A.csproj")
        .into_iter()
        .filter_map(|e| match e {
            BuildEvent::Diagnostic { diagnostic, .. } => Some(diagnostic),
            _ => None,
        })
        .collect();
    assert_eq!(diagnostics.len(), 2);

    let warning = &diagnostics[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.file.as_deref(), Some("/demo/A.csproj"));
    assert_eq!((warning.line, warning.column), (3, 5));
    assert_eq!(warning.code.as_deref(), Some("CS0168"));

    assert!(matches!(diagnostics[1].severity, Severity::Message(_)));
    assert_eq!(diagnostics[1].message, "building Build with Configuration=Debug");

    assert!(
        reporter
            .events()
            .iter()
            .any(|e| matches!(e, BuildEvent::TargetStarted { target, .. } if target == "Build"))
    );
}

#[tokio::test]
async fn missing_build_tool_aborts_the_batch() {
    let reporter = Arc::new(RecordingReporter::new());
    let mut template = sh_template();
    template.program = "/nonexistent/batchbuild-tool".to_string();
    let engine = Arc::new(ProcessBuildEngine::new(template, reporter.clone()));
    let s = BatchScheduler::new(engine, reporter.clone());

    let err = with_timeout(s.run_batch(
        vec![
            request("/demo/A.csproj", "Build"),
            request("/demo/B.csproj", "Build"),
        ],
        1,
    ))
    .await
    .unwrap_err();

    let BatchError::SchedulerAborted { reason, partial } = &err else {
        panic!("expected SchedulerAborted, got {err:?}");
    };
    assert!(reason.message.contains("launching build tool"));
    assert_eq!(partial.count(BuildStatus::Aborted), 2);
    assert!(s.engine().session().is_none());
}

#[tokio::test]
async fn submissions_outside_a_session_are_rejected() {
    let reporter = Arc::new(RecordingReporter::new());
    let engine = engine(reporter);

    assert!(
        engine
            .submit_sync(request("/demo/A.csproj", "Build"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn timed_out_batch_kills_its_build_processes() {
    init_tracing();
    let dir = tempdir().unwrap();
    let markers = [dir.path().join("a.done"), dir.path().join("b.done")];

    // Each build touches its project path after a second, unless killed first.
    let template = CommandTemplate {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            r#"sleep 1; touch "$0""#.to_string(),
            "{project}".to_string(),
        ],
        property_arg: "{key}={value}".to_string(),
        env: BTreeMap::new(),
    };
    let reporter = Arc::new(RecordingReporter::new());
    let engine = Arc::new(ProcessBuildEngine::new(template, reporter.clone()));
    let s = BatchScheduler::new(engine, reporter.clone()).with_options(SchedulerOptions {
        timeout: Some(Duration::from_millis(100)),
    });

    let batch = markers
        .iter()
        .map(|m| BuildRequest::without_properties(m.clone(), "Build"))
        .collect();
    let err = with_timeout(s.run_batch(batch, 2)).await.unwrap_err();
    assert!(matches!(err, BatchError::BatchTimedOut { .. }));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    for marker in &markers {
        assert!(!marker.exists(), "{} was built after the timeout", marker.display());
    }
    assert!(s.engine().session().is_none());
    assert!(
        reporter
            .finished()
            .iter()
            .all(|(_, status)| *status == BuildStatus::Aborted)
    );
    assert_eq!(reporter.finished().len(), 2);
}

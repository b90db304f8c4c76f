// tests/scheduler_scenarios.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use batchbuild::batch::{BatchScheduler, BuildStatus};
use batchbuild::engine::BuildEngine;
use batchbuild::errors::{BatchError, SessionError};
use batchbuild::report::NullReporter;
use batchbuild_test_utils::{FakeEngine, init_tracing, requests, with_timeout};

const PROJECTS: [&str; 3] = ["/src/P1.csproj", "/src/P2.csproj", "/src/P3.csproj"];

fn scheduler(engine: FakeEngine) -> BatchScheduler<FakeEngine> {
    BatchScheduler::new(Arc::new(engine), Arc::new(NullReporter))
}

fn paths(projects: &[&str]) -> Vec<PathBuf> {
    projects.iter().map(PathBuf::from).collect()
}

#[tokio::test]
async fn limit_one_builds_in_submission_order() {
    init_tracing();
    let s = scheduler(
        FakeEngine::new()
            .with_status(PROJECTS[1], BuildStatus::Failed)
            // A slow first project must still finish first.
            .with_delay(PROJECTS[0], Duration::from_millis(40)),
    );

    let result = with_timeout(s.run_batch(requests(&PROJECTS, "Build"), 1))
        .await
        .unwrap();

    let statuses: Vec<_> = result.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![BuildStatus::Succeeded, BuildStatus::Failed, BuildStatus::Succeeded]
    );

    let completion_order: Vec<_> = result
        .in_completion_order()
        .into_iter()
        .map(|o| o.project.clone())
        .collect();
    assert_eq!(completion_order, paths(&PROJECTS));

    let engine = s.engine();
    assert_eq!(engine.completions(), paths(&PROJECTS));
    assert_eq!(engine.max_in_flight(), 1);
    assert_eq!(engine.begin_count(), 1);
    assert_eq!(engine.end_count(), 1);
}

#[tokio::test]
async fn limit_three_runs_all_at_once() {
    init_tracing();
    let s = scheduler(
        FakeEngine::new()
            .with_default_delay(Duration::from_millis(100))
            .with_status(PROJECTS[0], BuildStatus::Failed)
            .with_status(PROJECTS[2], BuildStatus::Failed),
    );

    let result = with_timeout(s.run_batch(requests(&PROJECTS, "Build"), 3))
        .await
        .unwrap();

    assert_eq!(s.engine().max_in_flight(), 3);
    assert_eq!(result.len(), 3);
    assert_eq!(
        result.status_of(Path::new(PROJECTS[0])),
        Some(BuildStatus::Failed)
    );
    assert_eq!(
        result.status_of(Path::new(PROJECTS[1])),
        Some(BuildStatus::Succeeded)
    );
    assert_eq!(
        result.status_of(Path::new(PROJECTS[2])),
        Some(BuildStatus::Failed)
    );

    let failed = result.iter().find(|o| o.status == BuildStatus::Failed).unwrap();
    assert_eq!(failed.error_detail.as_deref(), Some("exit code 1"));
}

#[tokio::test]
async fn reverse_completion_order_releases_after_every_record() {
    init_tracing();
    let projects = ["/p/1", "/p/2", "/p/3", "/p/4", "/p/5"];
    let mut engine = FakeEngine::new();
    for (i, project) in projects.iter().enumerate() {
        // 250ms, 200ms, ... so later submissions finish first.
        engine = engine.with_delay(project, Duration::from_millis(250 - 50 * i as u64));
    }
    let s = scheduler(engine);

    let result = with_timeout(s.run_batch(requests(&projects, "Build"), 2))
        .await
        .unwrap();

    assert_eq!(result.len(), 5);
    assert!(result.all_succeeded());
    // Outcomes stay in submission order even though completions do not.
    let order: Vec<_> = result.iter().map(|o| o.project.clone()).collect();
    assert_eq!(order, paths(&projects));

    let engine = s.engine();
    assert_eq!(engine.completions().len(), 5);
    assert_eq!(engine.completions()[0], PathBuf::from("/p/2"));
    assert!(engine.max_in_flight() <= 2);
    assert_eq!(engine.end_count(), 1);
}

#[tokio::test]
async fn failed_projects_do_not_abort_the_batch() {
    let mut engine = FakeEngine::new();
    for project in PROJECTS {
        engine = engine.with_status(project, BuildStatus::Failed);
    }
    let s = scheduler(engine);

    let result = with_timeout(s.run_batch(requests(&PROJECTS, "Rebuild"), 2))
        .await
        .unwrap();

    assert_eq!(result.count(BuildStatus::Failed), 3);
    assert!(result.iter().all(|o| o.target == "Rebuild"));
    assert_eq!(s.engine().submissions().len(), 3);
}

#[tokio::test]
async fn empty_batch_opens_no_session() {
    let s = scheduler(FakeEngine::new());

    let result = s.run_batch(Vec::new(), 4).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(s.engine().begin_count(), 0);
    assert_eq!(s.engine().end_count(), 0);
}

#[tokio::test]
async fn zero_limit_is_a_usage_error() {
    let s = scheduler(FakeEngine::new());

    let err = s
        .run_batch(requests(&PROJECTS, "Build"), 0)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BatchError::Session(SessionError::InvalidConcurrencyLimit(0))
    ));
    assert_eq!(s.engine().begin_count(), 0);
    assert!(s.engine().submissions().is_empty());
}

#[tokio::test]
async fn busy_engine_rejects_a_second_session() {
    let s = scheduler(FakeEngine::new());
    s.engine().begin_session(1).unwrap();

    let err = s
        .run_batch(requests(&PROJECTS, "Build"), 2)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BatchError::Session(SessionError::SessionAlreadyActive)
    ));
    // The scheduler never owned the session, so it must not end it.
    assert_eq!(s.engine().end_count(), 0);
    assert!(s.engine().session().is_some());
}

#[tokio::test]
async fn engine_is_reused_across_batches() {
    let s = scheduler(FakeEngine::new());

    for limit in [1, 3] {
        let result = with_timeout(s.run_batch(requests(&PROJECTS, "Build"), limit))
            .await
            .unwrap();
        assert!(result.all_succeeded());
        assert!(s.engine().session().is_none());
    }

    assert_eq!(s.engine().begin_count(), 2);
    assert_eq!(s.engine().end_count(), 2);
}

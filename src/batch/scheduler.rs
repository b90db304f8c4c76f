// src/batch/scheduler.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::batch::collector::{RecordedOutcome, ResultCollector};
use crate::batch::outcome::{BatchResult, BuildOutcome, BuildStatus};
use crate::batch::request::BuildRequest;
use crate::engine::{BuildEngine, CompletionCallback, EngineResult, SessionGuard};
use crate::errors::{BatchError, CollectorError, EngineFailure, Result, SessionError, SubmitError};
use crate::report::{BuildEvent, ProgressReporter};

/// Tunables for [`BatchScheduler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerOptions {
    /// Upper bound on how long one batch may take. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Why a batch stopped before every outcome arrived.
#[derive(Debug)]
enum Interrupt {
    Session(SessionError),
    Engine(EngineFailure),
    Overflow { expected: usize },
}

impl From<CollectorError> for Interrupt {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Overflow { expected } => Interrupt::Overflow { expected },
            CollectorError::Faulted(failure) => Interrupt::Engine(failure),
        }
    }
}

impl From<SubmitError> for Interrupt {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Session(e) => Interrupt::Session(e),
            SubmitError::Engine(f) => Interrupt::Engine(f),
        }
    }
}

/// Runs batches of build requests against a shared engine.
///
/// Each [`BatchScheduler::run_batch`] call owns one engine session for its
/// whole duration and never lets more than `concurrency_limit` requests be
/// in flight at once:
///
/// - with a limit of 1, requests are built strictly one after another;
/// - with a higher limit, requests are submitted as fast as permits free
///   up, and completion callbacks feed a [`ResultCollector`].
///
/// A failed project is just an outcome. An engine failure aborts the batch,
/// and the session is ended on every exit path.
pub struct BatchScheduler<E: BuildEngine + ?Sized> {
    engine: Arc<E>,
    reporter: Arc<dyn ProgressReporter>,
    options: SchedulerOptions,
}

impl<E: BuildEngine + ?Sized> BatchScheduler<E> {
    pub fn new(engine: Arc<E>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            engine,
            reporter,
            options: SchedulerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Build every request and return their outcomes in submission order.
    pub async fn run_batch(
        &self,
        requests: Vec<BuildRequest>,
        concurrency_limit: usize,
    ) -> Result<BatchResult> {
        if concurrency_limit < 1 {
            return Err(SessionError::InvalidConcurrencyLimit(concurrency_limit).into());
        }
        if requests.is_empty() {
            debug!("empty batch; nothing to build");
            return Ok(BatchResult::default());
        }

        info!(
            requests = requests.len(),
            limit = concurrency_limit,
            "starting build batch"
        );

        let session = SessionGuard::begin(self.engine.as_ref(), concurrency_limit)?;
        let collector = Arc::new(ResultCollector::new(requests.len()));
        let progress = Arc::new(BatchProgress::new(Arc::clone(&self.reporter)));

        let work = async {
            if concurrency_limit == 1 {
                self.run_sequential(&requests, &collector, &progress).await
            } else {
                self.run_parallel(&requests, concurrency_limit, &collector, &progress)
                    .await
            }
        };

        let finished = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(finished) => finished,
                Err(_) => {
                    warn!(timeout = ?limit, "build batch timed out; aborting");
                    progress.abandon();
                    session.release();
                    let partial = assemble(
                        &requests,
                        collector.snapshot(),
                        &format!("batch timed out after {limit:?}"),
                    );
                    return Err(BatchError::BatchTimedOut {
                        timeout: limit,
                        partial,
                    });
                }
            },
            None => work.await,
        };

        let interrupt = match finished {
            Ok(records) => {
                session.end()?;
                let overflows = collector.overflow_count();
                if overflows > 0 {
                    return Err(BatchError::CollectorOverflow {
                        expected: collector.expected(),
                    });
                }
                let result = assemble(&requests, records, "no outcome recorded");
                info!(
                    succeeded = result.count(BuildStatus::Succeeded),
                    failed = result.count(BuildStatus::Failed),
                    "build batch finished"
                );
                return Ok(result);
            }
            Err(interrupt) => interrupt,
        };

        // Nothing may reach the reporter or the collector past this point.
        progress.abandon();
        session.release();

        match interrupt {
            Interrupt::Engine(reason) => {
                error!(error = %reason, "build engine failed; aborting batch");
                let partial = assemble(
                    &requests,
                    collector.snapshot(),
                    &format!("batch aborted: {}", reason.message),
                );
                Err(BatchError::SchedulerAborted { reason, partial })
            }
            Interrupt::Session(e) => Err(e.into()),
            Interrupt::Overflow { expected } => Err(BatchError::CollectorOverflow { expected }),
        }
    }

    /// One request at a time: completion order equals submission order.
    async fn run_sequential(
        &self,
        requests: &[BuildRequest],
        collector: &ResultCollector,
        progress: &BatchProgress,
    ) -> std::result::Result<Vec<RecordedOutcome>, Interrupt> {
        for (index, request) in requests.iter().enumerate() {
            progress.start(index, request);

            match self.engine.submit_sync(request.clone()).await {
                Ok(outcome) => {
                    let status = outcome.status;
                    if let Some(recorded) =
                        progress.finish(index, status, || collector.record(index, outcome))
                    {
                        recorded?;
                    }
                }
                Err(SubmitError::Engine(failure)) => {
                    progress.finish(index, BuildStatus::Aborted, || {
                        collector.fail(failure.clone())
                    });
                    return Err(Interrupt::Engine(failure));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(collector.await_all().await?)
    }

    /// Submit without waiting per request; a semaphore keeps at most
    /// `limit` submissions outstanding.
    async fn run_parallel(
        &self,
        requests: &[BuildRequest],
        limit: usize,
        collector: &Arc<ResultCollector>,
        progress: &Arc<BatchProgress>,
    ) -> std::result::Result<Vec<RecordedOutcome>, Interrupt> {
        let permits = Arc::new(Semaphore::new(limit));

        for (index, request) in requests.iter().enumerate() {
            let permit = Arc::clone(&permits).acquire_owned().await.map_err(|_| {
                Interrupt::Engine(EngineFailure::new(
                    request.project(),
                    "concurrency permits closed",
                ))
            })?;

            if collector.is_faulted() {
                debug!(index, "engine failed earlier; not submitting further requests");
                break;
            }

            progress.start(index, request);
            let on_complete = completion_callback(
                index,
                Arc::clone(collector),
                Arc::clone(progress),
                permit,
            );

            match self.engine.submit_async(request.clone(), on_complete) {
                Ok(pending) => {
                    debug!(
                        index,
                        id = pending.id,
                        project = %request.project().display(),
                        "request submitted"
                    );
                }
                Err(SubmitError::Engine(failure)) => {
                    progress.finish(index, BuildStatus::Aborted, || {
                        collector.fail(failure.clone())
                    });
                    return Err(Interrupt::Engine(failure));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(collector.await_all().await?)
    }
}

/// Callback recording the outcome of request `index`.
///
/// It owns the request's concurrency permit, which is released only after
/// the outcome is recorded. Once the batch is abandoned it does nothing.
fn completion_callback(
    index: usize,
    collector: Arc<ResultCollector>,
    progress: Arc<BatchProgress>,
    permit: OwnedSemaphorePermit,
) -> CompletionCallback {
    Box::new(move |result: EngineResult| {
        let _permit = permit;
        match result {
            Ok(outcome) => {
                let status = outcome.status;
                match progress.finish(index, status, || collector.record(index, outcome)) {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => error!(index, error = %e, "dropping outcome"),
                    None => debug!(index, "late outcome for an abandoned batch ignored"),
                }
            }
            Err(failure) => {
                error!(index, error = %failure, "engine failure reported for request");
                progress.finish(index, BuildStatus::Aborted, || collector.fail(failure));
            }
        }
    })
}

/// Started/finished bookkeeping for one batch.
///
/// Every `ProjectFinished` event goes through here, so each started request
/// is finished exactly once. After [`BatchProgress::abandon`] neither the
/// reporter nor the collector hears about the batch again.
struct BatchProgress {
    reporter: Arc<dyn ProgressReporter>,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    abandoned: bool,
    /// Started requests without a `ProjectFinished` yet, by index.
    open: BTreeMap<usize, BuildRequest>,
}

impl BatchProgress {
    fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn start(&self, index: usize, request: &BuildRequest) {
        let mut state = self.lock();
        if state.abandoned {
            return;
        }
        state.open.insert(index, request.clone());
        self.reporter.report(&BuildEvent::ProjectStarted {
            project: request.project().to_path_buf(),
            target: request.target().to_string(),
        });
    }

    /// Report request `index` as finished and run `then` under the same
    /// lock. Returns `None` if the batch was abandoned or the request was
    /// already finished.
    fn finish<R>(&self, index: usize, status: BuildStatus, then: impl FnOnce() -> R) -> Option<R> {
        let mut state = self.lock();
        if state.abandoned {
            return None;
        }
        let request = state.open.remove(&index)?;
        report_finished(self.reporter.as_ref(), &request, status);
        Some(then())
    }

    /// Close the batch and report every still-open request as aborted.
    fn abandon(&self) {
        let open = {
            let mut state = self.lock();
            state.abandoned = true;
            std::mem::take(&mut state.open)
        };
        for request in open.values() {
            report_finished(self.reporter.as_ref(), request, BuildStatus::Aborted);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn report_finished(reporter: &dyn ProgressReporter, request: &BuildRequest, status: BuildStatus) {
    reporter.report(&BuildEvent::ProjectFinished {
        project: request.project().to_path_buf(),
        target: request.target().to_string(),
        status,
    });
}

/// Put recorded outcomes back into submission order, marking every request
/// without one as aborted with `missing_detail`.
fn assemble(
    requests: &[BuildRequest],
    records: Vec<RecordedOutcome>,
    missing_detail: &str,
) -> BatchResult {
    let mut slots: Vec<Option<BuildOutcome>> = vec![None; requests.len()];
    for record in records {
        match slots.get_mut(record.index) {
            Some(slot) if slot.is_none() => *slot = Some(record.outcome),
            Some(_) => warn!(index = record.index, "duplicate outcome ignored"),
            None => warn!(index = record.index, "outcome for unknown request ignored"),
        }
    }

    let outcomes = slots
        .into_iter()
        .zip(requests)
        .map(|(slot, request)| slot.unwrap_or_else(|| BuildOutcome::aborted(request, missing_detail)))
        .collect();
    BatchResult::new(outcomes)
}

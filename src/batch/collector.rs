// src/batch/collector.rs

//! Countdown barrier that gathers one outcome per submitted request.
//!
//! Completion callbacks call [`ResultCollector::record`] from whatever
//! thread the engine finishes on; the single coordinating task blocks in
//! [`ResultCollector::await_all`] until the countdown reaches zero.
//!
//! Extra records past `expected` are rejected with
//! [`CollectorError::Overflow`] and never stored. That only happens when an
//! engine reports a completion twice, so it is logged at error level instead
//! of panicking on an engine thread.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error};

use crate::batch::outcome::BuildOutcome;
use crate::errors::{CollectorError, EngineFailure};

/// An outcome together with the submission index of its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutcome {
    pub index: usize,
    pub outcome: BuildOutcome,
}

#[derive(Debug, Default)]
struct CollectorState {
    /// Records in completion order.
    records: Vec<RecordedOutcome>,
    fault: Option<EngineFailure>,
    overflows: usize,
}

#[derive(Debug)]
pub struct ResultCollector {
    expected: usize,
    state: Mutex<CollectorState>,
    done: Notify,
}

impl ResultCollector {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(CollectorState::default()),
            done: Notify::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Record one outcome. Returns how many are still outstanding.
    pub fn record(&self, index: usize, outcome: BuildOutcome) -> Result<usize, CollectorError> {
        let remaining = {
            let mut state = self.lock();
            if state.records.len() >= self.expected {
                state.overflows += 1;
                error!(
                    expected = self.expected,
                    index,
                    project = %outcome.project.display(),
                    "result collector overflow; dropping duplicate outcome"
                );
                return Err(CollectorError::Overflow {
                    expected: self.expected,
                });
            }
            state.records.push(RecordedOutcome { index, outcome });
            self.expected - state.records.len()
        };

        debug!(index, remaining, "outcome recorded");
        if remaining == 0 {
            self.done.notify_one();
        }
        Ok(remaining)
    }

    /// Fault the collector: the waiter is released with the failure instead
    /// of waiting for the remaining records. The first fault wins.
    pub fn fail(&self, failure: EngineFailure) {
        {
            let mut state = self.lock();
            if state.fault.is_none() {
                state.fault = Some(failure);
            }
        }
        self.done.notify_one();
    }

    pub fn is_faulted(&self) -> bool {
        self.lock().fault.is_some()
    }

    pub fn overflow_count(&self) -> usize {
        self.lock().overflows
    }

    /// Records made so far, in completion order.
    pub fn snapshot(&self) -> Vec<RecordedOutcome> {
        self.lock().records.clone()
    }

    /// Wait until all `expected` outcomes were recorded and return them in
    /// completion order, or return the fault if the collector was failed.
    pub async fn await_all(&self) -> Result<Vec<RecordedOutcome>, CollectorError> {
        loop {
            {
                let state = self.lock();
                if let Some(fault) = &state.fault {
                    return Err(CollectorError::Faulted(fault.clone()));
                }
                if state.records.len() >= self.expected {
                    return Ok(state.records.clone());
                }
            }
            // `notify_one` stores a permit when nobody is waiting yet, so a
            // record landing between the check above and this await is not lost.
            self.done.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::request::BuildRequest;
    use std::sync::Arc;
    use std::time::Duration;

    fn outcome(name: &str) -> BuildOutcome {
        BuildOutcome::succeeded(&BuildRequest::without_properties(name, "Build"))
    }

    #[tokio::test]
    async fn zero_expected_returns_immediately() {
        let collector = ResultCollector::new(0);
        let records = collector.await_all().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn records_are_returned_in_completion_order() {
        let collector = ResultCollector::new(3);
        assert_eq!(collector.record(2, outcome("/c")).unwrap(), 2);
        assert_eq!(collector.record(0, outcome("/a")).unwrap(), 1);
        assert_eq!(collector.record(1, outcome("/b")).unwrap(), 0);

        let indices: Vec<usize> = collector
            .await_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[test]
    fn overflow_is_rejected_and_not_stored() {
        let collector = ResultCollector::new(1);
        collector.record(0, outcome("/a")).unwrap();

        let err = collector.record(0, outcome("/a")).unwrap_err();
        assert_eq!(err, CollectorError::Overflow { expected: 1 });
        assert_eq!(collector.snapshot().len(), 1);
        assert_eq!(collector.overflow_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_records_release_the_waiter() {
        let collector = Arc::new(ResultCollector::new(16));

        for i in 0..16 {
            let c = Arc::clone(&collector);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis((16 - i) as u64)).await;
                c.record(i, outcome(&format!("/p{i}"))).unwrap();
            });
        }

        let records = tokio::time::timeout(Duration::from_secs(5), collector.await_all())
            .await
            .expect("collector never released")
            .unwrap();
        assert_eq!(records.len(), 16);
    }

    #[tokio::test]
    async fn fault_releases_waiter_early() {
        let collector = Arc::new(ResultCollector::new(2));
        collector.record(0, outcome("/a")).unwrap();

        let c = Arc::clone(&collector);
        tokio::spawn(async move {
            c.fail(EngineFailure::new("/b", "node crashed"));
        });

        let err = collector.await_all().await.unwrap_err();
        assert!(matches!(err, CollectorError::Faulted(f) if f.message == "node crashed"));
        assert_eq!(collector.snapshot().len(), 1);
    }
}

// src/batch/mod.rs

//! Batch orchestration: the request/outcome model, the result collector and
//! the concurrency-limited scheduler.
//!
//! - [`request`] defines [`BuildRequest`] and the shared property set.
//! - [`outcome`] defines per-request outcomes and the [`BatchResult`].
//! - [`collector`] is the countdown barrier completion callbacks feed.
//! - [`scheduler`] drives one engine session per batch.

pub mod collector;
pub mod outcome;
pub mod request;
pub mod scheduler;

pub use collector::{RecordedOutcome, ResultCollector};
pub use outcome::{BatchResult, BuildOutcome, BuildStatus};
pub use request::{requests_for, BuildRequest, SharedProperties};
pub use scheduler::{BatchScheduler, SchedulerOptions};

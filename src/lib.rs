// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod report;
pub mod types;

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::batch::{BatchResult, BatchScheduler, BuildStatus, SchedulerOptions};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{BatchConfig, ConfigFile};
use crate::engine::ProcessBuildEngine;
use crate::errors::BatchError;
use crate::report::{ConsoleReporter, ProgressReporter};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the console reporter
/// - one process engine shared by every batch
/// - the batch scheduler
///
/// Batches run one after another. A batch that aborts or times out is
/// reported and the remaining batches still run; configuration and session
/// usage errors stop the run.
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let cfg = load_and_validate(&args.config)?;

    let batches = selected_batches(&cfg, args.batch.as_deref())?;
    let verbosity = args.verbosity.unwrap_or(cfg.config.verbosity);
    let timeout = args.timeout.or(cfg.timeout);

    if args.dry_run {
        print_dry_run(&cfg, &batches, args.jobs);
        return Ok(RunSummary::default());
    }

    let reporter: Arc<dyn ProgressReporter> = Arc::new(ConsoleReporter::new(verbosity));
    let engine = Arc::new(ProcessBuildEngine::new(
        cfg.command_template(),
        Arc::clone(&reporter),
    ));
    let scheduler =
        BatchScheduler::new(engine, reporter).with_options(SchedulerOptions { timeout });

    let mut summary = RunSummary::default();

    for batch in batches {
        let limit = args.jobs.unwrap_or_else(|| cfg.concurrency_for(batch));
        let requests = cfg.requests_for(batch);
        info!(batch = %batch.name, builds = requests.len(), limit, "running batch");

        let report = match scheduler.run_batch(requests, limit).await {
            Ok(result) => BatchReport {
                name: batch.name.clone(),
                result,
                interrupted: None,
            },
            Err(err @ (BatchError::SchedulerAborted { .. } | BatchError::BatchTimedOut { .. })) => {
                warn!(batch = %batch.name, error = %err, "batch did not complete");
                BatchReport {
                    name: batch.name.clone(),
                    result: err.partial_result().cloned().unwrap_or_default(),
                    interrupted: Some(err.to_string()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        report.print();
        summary.batches.push(report);
    }

    summary.print();
    Ok(summary)
}

/// Result of one configured batch as seen by the CLI.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub name: String,
    pub result: BatchResult,
    /// Why the batch stopped early, if it did.
    pub interrupted: Option<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.interrupted.is_none() && self.result.all_succeeded()
    }

    fn print(&self) {
        for outcome in self.result.iter() {
            println!(
                "==> {} {} ({})",
                outcome.status,
                outcome.project.display(),
                outcome.target
            );
            if let Some(detail) = outcome
                .error_detail
                .as_deref()
                .filter(|_| outcome.status != BuildStatus::Succeeded)
            {
                println!("    {detail}");
            }
        }
        if let Some(reason) = &self.interrupted {
            println!("==> batch '{}' stopped: {reason}", self.name);
        }
    }
}

/// Everything `run` did, used by `main` for the exit code.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub batches: Vec<BatchReport>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.batches.iter().all(BatchReport::succeeded)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() { 0 } else { 1 }
    }

    pub fn count(&self, status: BuildStatus) -> usize {
        self.batches.iter().map(|b| b.result.count(status)).sum()
    }

    fn print(&self) {
        println!();
        for batch in &self.batches {
            println!(
                "batch '{}': {} succeeded, {} failed, {} aborted",
                batch.name,
                batch.result.count(BuildStatus::Succeeded),
                batch.result.count(BuildStatus::Failed),
                batch.result.count(BuildStatus::Aborted),
            );
        }
        if self.batches.len() > 1 {
            println!(
                "total: {} succeeded, {} failed, {} aborted",
                self.count(BuildStatus::Succeeded),
                self.count(BuildStatus::Failed),
                self.count(BuildStatus::Aborted),
            );
        }
        if self.all_succeeded() {
            println!("Build succeeded.");
        } else {
            println!("Build FAILED.");
        }
    }
}

/// Batches to run, honouring `--batch`.
fn selected_batches<'a>(cfg: &'a ConfigFile, only: Option<&str>) -> Result<Vec<&'a BatchConfig>> {
    match only {
        Some(name) => match cfg.batch(name) {
            Some(batch) => Ok(vec![batch]),
            None => bail!("no batch named '{name}' in config"),
        },
        None => Ok(cfg.batches.iter().collect()),
    }
}

/// Simple dry-run output: print batches, builds and command lines.
fn print_dry_run(cfg: &ConfigFile, batches: &[&BatchConfig], jobs: Option<usize>) {
    let template = cfg.command_template();

    println!("batchbuild dry-run");
    println!("  engine.program = {}", template.program);
    println!("  config.concurrency = {}", cfg.config.concurrency);
    if let Some(timeout) = cfg.timeout {
        println!("  config.timeout = {timeout:?}");
    }
    println!();

    for batch in batches {
        let limit = jobs.unwrap_or_else(|| cfg.concurrency_for(batch));
        println!("batch {} (concurrency {limit}):", batch.name);
        for request in cfg.requests_for(batch) {
            println!("  - {request}");
            println!(
                "      cmd: {} {}",
                template.program,
                template.render_args(&request).join(" ")
            );
        }
    }

    debug!("dry-run complete (no builds started)");
}

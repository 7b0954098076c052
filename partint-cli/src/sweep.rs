//! Benchmark Sweep
//!
//! Times one `integrate` call per `(jobs, executor)` configuration and
//! records every run in three places:
//!
//! - the progress log: a header per configuration, the job `starts` /
//!   `ends` lines, then `Result:` and `Time:` lines
//! - the results file: one timing record per configuration
//! - the in-memory [`SweepReport`], later rendered as a table and JSON
//!
//! Executor construction and teardown are outside the timed region.

use crate::config::{ConfigError, HarnessConfig, OutputConfig};
use crate::metadata::build_report_meta;
use crate::supervisor::ProcessPoolExecutor;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use partint_core::{
    ExecutorKind, FileLog, Integrand, LogSink, LogTarget, SequentialExecutor, TaskExecutor,
    ThreadPoolExecutor, integrate,
};
use partint_report::{
    IntegralInfo, RunOutcome, RunRecord, START_MARKER, SweepReport, config_header,
    generate_json_report, outcome_lines, results_record,
};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything needed to run a sweep, resolved from configuration
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Function being integrated
    pub integrand: Integrand,
    /// Integral description, bounds already evaluated
    pub integral: IntegralInfo,
    /// Job counts, in order
    pub jobs: RangeInclusive<u32>,
    /// Executor kinds timed at each job count, in order
    pub executors: Vec<ExecutorKind>,
    /// Record failures and continue
    pub keep_going: bool,
    /// Handshake timeout for worker processes
    pub worker_timeout: Duration,
    /// Binary started for process workers (current executable if `None`)
    pub worker_binary: Option<PathBuf>,
}

impl SweepPlan {
    /// Resolve a plan from configuration
    pub fn from_config(config: &HarnessConfig) -> anyhow::Result<Self> {
        let integral = &config.integral;
        let integrand = Integrand::named(&integral.function)?;
        let (lower, upper) = integral.bounds()?;
        if integral.iterations == 0 {
            return Err(ConfigError::Sweep("iterations must be at least 1".to_string()).into());
        }
        if config.sweep.executors.is_empty() {
            return Err(ConfigError::Sweep("no executors selected".to_string()).into());
        }

        Ok(Self {
            integrand,
            integral: IntegralInfo {
                function: integral.function.clone(),
                lower_expr: integral.lower.clone(),
                upper_expr: integral.upper.clone(),
                lower,
                upper,
                iterations: integral.iterations,
            },
            jobs: config.sweep.job_counts()?,
            executors: config.sweep.executors.clone(),
            keep_going: config.sweep.keep_going,
            worker_timeout: config.sweep.worker_timeout()?,
            worker_binary: None,
        })
    }

    /// Number of configurations the sweep will run
    pub fn configurations(&self) -> usize {
        self.jobs.clone().count() * self.executors.len()
    }
}

/// Executor owned by one configuration
enum SweepExecutor {
    Sequential(SequentialExecutor),
    Thread(ThreadPoolExecutor),
    Process(ProcessPoolExecutor),
}

impl SweepExecutor {
    fn start(kind: ExecutorKind, workers: usize, plan: &SweepPlan) -> anyhow::Result<Self> {
        Ok(match kind {
            ExecutorKind::Sequential => SweepExecutor::Sequential(SequentialExecutor::new()),
            ExecutorKind::Thread => SweepExecutor::Thread(ThreadPoolExecutor::new(workers)?),
            ExecutorKind::Process => {
                let binary = match &plan.worker_binary {
                    Some(path) => path.clone(),
                    None => std::env::current_exe()?,
                };
                SweepExecutor::Process(ProcessPoolExecutor::spawn_binary(
                    binary,
                    workers,
                    plan.worker_timeout,
                )?)
            }
        })
    }

    fn as_dyn(&self) -> &dyn TaskExecutor {
        match self {
            SweepExecutor::Sequential(e) => e,
            SweepExecutor::Thread(e) => e,
            SweepExecutor::Process(e) => e,
        }
    }

    fn shutdown(self) -> anyhow::Result<()> {
        match self {
            SweepExecutor::Sequential(_) => {}
            SweepExecutor::Thread(e) => e.shutdown(),
            SweepExecutor::Process(e) => e.shutdown()?,
        }
        Ok(())
    }
}

/// Run every configuration of `plan`, writing files under `output`.
///
/// Without `keep_going` the first failing configuration aborts the sweep
/// after its failure has been written to both files.
pub fn run_sweep(
    plan: &SweepPlan,
    output: &OutputConfig,
    show_progress: bool,
) -> anyhow::Result<SweepReport> {
    std::fs::create_dir_all(&output.directory)
        .with_context(|| format!("Failed to create {}", output.directory))?;

    let log_path = output.log_path();
    let results_path = output.results_path();
    let log = Arc::new(
        FileLog::create(&log_path)
            .with_context(|| format!("Failed to create {}", log_path.display()))?,
    );
    let results = FileLog::create(&results_path)
        .with_context(|| format!("Failed to create {}", results_path.display()))?;
    log.append_line(START_MARKER)?;
    results.append_line(START_MARKER)?;

    let sink = LogSink::to(log.clone());
    let mut report = SweepReport::new(build_report_meta(), plan.integral.clone());

    let pb = if show_progress {
        ProgressBar::new(plan.configurations() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    tracing::info!(
        function = %plan.integral.function,
        iterations = plan.integral.iterations,
        configurations = plan.configurations(),
        "starting sweep"
    );

    for jobs in plan.jobs.clone() {
        for &kind in &plan.executors {
            pb.set_message(config_header(kind, jobs));
            log.append_line(&config_header(kind, jobs))?;

            let (elapsed, result) = run_configuration(plan, kind, jobs, &sink);
            let record = RunRecord {
                executor: kind,
                jobs,
                elapsed_secs: elapsed.as_secs_f64(),
                outcome: match &result {
                    Ok(value) => RunOutcome::Completed { value: *value },
                    Err(e) => RunOutcome::Failed {
                        message: format!("{:#}", e),
                    },
                },
            };

            for line in outcome_lines(&record) {
                log.append_line(&line)?;
            }
            results.append_line(&results_record(&record))?;
            pb.inc(1);

            match result {
                Ok(value) => {
                    tracing::debug!(executor = %kind, jobs, value, secs = record.elapsed_secs, "configuration done");
                    report.runs.push(record);
                }
                Err(e) if plan.keep_going => {
                    tracing::warn!(executor = %kind, jobs, error = %format!("{:#}", e), "configuration failed, continuing");
                    report.runs.push(record);
                }
                Err(e) => {
                    pb.abandon_with_message("failed");
                    return Err(e.context(format!("{} failed", config_header(kind, jobs))));
                }
            }
        }
    }

    pb.finish_and_clear();

    if output.json {
        let path = output.json_path();
        let json = generate_json_report(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    Ok(report)
}

/// Start an executor, time one integration on it, shut it down.
fn run_configuration(
    plan: &SweepPlan,
    kind: ExecutorKind,
    jobs: u32,
    sink: &LogSink,
) -> (Duration, anyhow::Result<f64>) {
    let executor = match SweepExecutor::start(kind, jobs as usize, plan) {
        Ok(executor) => executor,
        Err(e) => return (Duration::ZERO, Err(e.context("failed to start executor"))),
    };

    let started = Instant::now();
    let result = integrate(
        &plan.integrand,
        plan.integral.lower,
        plan.integral.upper,
        executor.as_dyn(),
        jobs,
        plan.integral.iterations,
        sink,
    );
    let elapsed = started.elapsed();

    let result = result.map_err(anyhow::Error::from);
    if let Err(e) = executor.shutdown() {
        tracing::warn!(executor = %kind, jobs, error = %e, "executor shutdown failed");
    }
    (elapsed, result)
}

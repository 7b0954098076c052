//! Task executors
//!
//! [`integrate`](crate::integrate) only needs three things from an
//! executor: accept a job, hand back a [`JobHandle`], and let the caller
//! block on that handle. Executors in this crate:
//!
//! - [`SequentialExecutor`]: computes the job inside `submit`, on the
//!   caller's thread.
//! - [`ThreadPoolExecutor`]: rayon pool, workers share memory with the
//!   caller.
//!
//! The process-backed pool lives in `partint-cli`, next to the supervisor
//! that owns the worker processes.

use crate::error::{ExecutorError, JobError};
use crate::job::IntegrationJob;
use crate::log::LogSink;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// Executor variants known to the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Jobs run one after another on the caller's thread
    Sequential,
    /// Shared-memory thread pool
    Thread,
    /// Isolated worker processes
    Process,
}

impl ExecutorKind {
    /// Name used in progress logs and results files
    pub fn display_name(self) -> &'static str {
        match self {
            ExecutorKind::Sequential => "SequentialExecutor",
            ExecutorKind::Thread => "ThreadPoolExecutor",
            ExecutorKind::Process => "ProcessPoolExecutor",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "inline" => Ok(ExecutorKind::Sequential),
            "thread" | "threads" => Ok(ExecutorKind::Thread),
            "process" | "processes" => Ok(ExecutorKind::Process),
            other => Err(format!("Unknown executor kind: {}", other)),
        }
    }
}

/// Capability to run integration jobs.
pub trait TaskExecutor: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> ExecutorKind;

    /// Number of jobs that can make progress at the same time
    fn workers(&self) -> usize;

    /// Accept a job. Refusal is reported here, not at collection time.
    fn submit(&self, job: IntegrationJob, log: LogSink) -> Result<JobHandle, ExecutorError>;
}

/// Pending or completed result of one job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: u32,
    rx: Receiver<Result<f64, JobError>>,
}

/// Sending half of a [`JobHandle`], owned by whoever computes the job.
#[derive(Debug)]
pub struct JobCompleter {
    job_id: u32,
    tx: Sender<Result<f64, JobError>>,
}

impl JobHandle {
    /// A connected handle/completer pair
    pub fn pair(job_id: u32) -> (JobCompleter, JobHandle) {
        let (tx, rx) = mpsc::channel();
        (JobCompleter { job_id, tx }, JobHandle { job_id, rx })
    }

    /// A handle that is already resolved
    pub fn ready(job_id: u32, result: Result<f64, JobError>) -> Self {
        let (completer, handle) = Self::pair(job_id);
        completer.complete(result);
        handle
    }

    /// Partition index of the job
    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    /// Block until the job finishes and return its partial sum.
    pub fn wait(self) -> Result<f64, JobError> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(JobError::WorkerLost {
                job_id: self.job_id,
                reason: "result channel closed before completion".to_string(),
            })
        })
    }
}

impl JobCompleter {
    /// Partition index of the job
    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    /// Deliver the result. A handle that was dropped is not an error.
    pub fn complete(self, result: Result<f64, JobError>) {
        let _ = self.tx.send(result);
    }
}

/// Runs each job to completion inside `submit`.
#[derive(Debug, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    /// New sequential executor
    pub fn new() -> Self {
        Self
    }
}

impl TaskExecutor for SequentialExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Sequential
    }

    fn workers(&self) -> usize {
        1
    }

    fn submit(&self, job: IntegrationJob, log: LogSink) -> Result<JobHandle, ExecutorError> {
        let job_id = job.job_id();
        Ok(JobHandle::ready(job_id, job.run(&log)))
    }
}

/// Fixed-size pool of native threads.
pub struct ThreadPoolExecutor {
    pool: ThreadPool,
    workers: usize,
    closed: AtomicBool,
}

impl ThreadPoolExecutor {
    /// Start a pool with `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("partint-worker-{i}"))
            .build()
            .map_err(|e| ExecutorError::Spawn(format!("Failed to build thread pool: {}", e)))?;
        tracing::debug!(workers, "thread pool started");
        Ok(Self {
            pool,
            workers,
            closed: AtomicBool::new(false),
        })
    }

    /// Refuse further submissions. Jobs already accepted still complete.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl TaskExecutor for ThreadPoolExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Thread
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&self, job: IntegrationJob, log: LogSink) -> Result<JobHandle, ExecutorError> {
        if self.is_shut_down() {
            return Err(ExecutorError::ShutDown);
        }
        let (completer, handle) = JobHandle::pair(job.job_id());
        self.pool.spawn(move || completer.complete(job.run(&log)));
        Ok(handle)
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("workers", &self.workers)
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

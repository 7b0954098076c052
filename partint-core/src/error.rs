//! Error types for integration, jobs and executors.

use partint_ipc::FailureKind;
use thiserror::Error;

/// Failure of a single job, surfaced when its handle is waited on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("job {job_id} panicked: {message}")]
    Panicked { job_id: u32, message: String },

    #[error("job {job_id}: integrand returned {value} at sample {index} (x = {x})")]
    NonFinite {
        job_id: u32,
        index: u64,
        x: f64,
        value: f64,
    },

    #[error("job {job_id}: unknown integrand '{name}'")]
    UnknownIntegrand { job_id: u32, name: String },

    /// The worker computing the job went away without reporting.
    #[error("job {job_id}: worker lost ({reason})")]
    WorkerLost { job_id: u32, reason: String },

    /// A failure reported by a worker process.
    #[error("job {job_id} failed in worker ({kind:?}): {message}")]
    Remote {
        job_id: u32,
        kind: FailureKind,
        message: String,
    },
}

impl JobError {
    /// Partition index of the failed job
    pub fn job_id(&self) -> u32 {
        match self {
            JobError::Panicked { job_id, .. }
            | JobError::NonFinite { job_id, .. }
            | JobError::UnknownIntegrand { job_id, .. }
            | JobError::WorkerLost { job_id, .. }
            | JobError::Remote { job_id, .. } => *job_id,
        }
    }

    /// Category used on the wire
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            JobError::Panicked { .. } => FailureKind::Panic,
            JobError::NonFinite { .. } => FailureKind::NonFinite,
            JobError::UnknownIntegrand { .. } => FailureKind::UnknownIntegrand,
            JobError::WorkerLost { .. } => FailureKind::WorkerLost,
            JobError::Remote { kind, .. } => *kind,
        }
    }
}

/// An executor refused a unit of work at submission time.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor has been shut down")]
    ShutDown,

    #[error("integrand '{0}' cannot be sent to worker processes")]
    NotTransferable(String),

    #[error("integrand '{0}' is not registered in the worker binary")]
    UnsupportedIntegrand(String),

    #[error("no live workers in the pool")]
    NoLiveWorkers,

    #[error("failed to start workers: {0}")]
    Spawn(String),

    #[error("failed to dispatch job: {0}")]
    Dispatch(String),
}

/// Failure of a whole `integrate` call.
#[derive(Debug, Error)]
pub enum IntegrateError {
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("submitting job {job_id} failed: {source}")]
    Submission {
        job_id: u32,
        #[source]
        source: ExecutorError,
    },

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Failure resolving an integrand by name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no integrand registered as '{0}'")]
pub struct UnknownIntegrand(pub String);

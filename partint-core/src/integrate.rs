//! Partitioned integration.

use crate::error::IntegrateError;
use crate::executor::{JobHandle, TaskExecutor};
use crate::integrand::Integrand;
use crate::job::IntegrationJob;
use crate::log::LogSink;
use crate::partition::partition;

/// Integrate `f` over `[a, b]` with a left-rectangle rule of `n_iter`
/// samples split across `n_jobs` jobs on `executor`.
///
/// All jobs are submitted before any is awaited; handles are then waited
/// on in submission order and the partial sums added in that order, so the
/// result is reproducible for fixed `(n_iter, n_jobs)`. The first failing
/// job (in submission order) fails the whole call. `a > b` integrates with
/// a negative step; `a == b` yields exactly zero.
///
/// The executor is only borrowed; starting and stopping it is the
/// caller's business.
pub fn integrate<E>(
    f: &Integrand,
    a: f64,
    b: f64,
    executor: &E,
    n_jobs: u32,
    n_iter: u64,
    log: &LogSink,
) -> Result<f64, IntegrateError>
where
    E: TaskExecutor + ?Sized,
{
    if n_jobs == 0 {
        return Err(IntegrateError::DegenerateInput(
            "n_jobs must be positive".to_string(),
        ));
    }
    if n_iter == 0 {
        return Err(IntegrateError::DegenerateInput(
            "n_iter must be positive".to_string(),
        ));
    }

    let step = (b - a) / n_iter as f64;
    tracing::debug!(
        integrand = f.name(),
        executor = %executor.kind(),
        n_jobs,
        n_iter,
        step,
        "dispatching integration"
    );

    let mut handles: Vec<JobHandle> = Vec::with_capacity(n_jobs as usize);
    for (job_i, range) in (0..n_jobs).zip(partition(n_iter, n_jobs)) {
        let job = IntegrationJob::new(f.clone(), a, step, range, job_i);
        let handle = executor
            .submit(job, log.clone())
            .map_err(|source| IntegrateError::Submission {
                job_id: job_i,
                source,
            })?;
        handles.push(handle);
    }

    let mut acc = 0.0;
    for handle in handles {
        acc += handle.wait()?;
    }
    Ok(acc)
}

/// Arguments of one [`integrate`] call as a value.
///
/// Defaults mirror the classic benchmark script: one job, 1000 samples.
#[derive(Debug, Clone)]
pub struct IntegrationRequest {
    /// Function to integrate
    pub integrand: Integrand,
    /// Lower bound
    pub a: f64,
    /// Upper bound
    pub b: f64,
    /// Number of partitions
    pub n_jobs: u32,
    /// Total number of samples
    pub n_iter: u64,
}

impl IntegrationRequest {
    /// Integrate `integrand` over `[a, b]` with default job and sample counts
    pub fn new(integrand: Integrand, a: f64, b: f64) -> Self {
        Self {
            integrand,
            a,
            b,
            n_jobs: 1,
            n_iter: 1000,
        }
    }

    /// Set the number of partitions
    pub fn jobs(mut self, n_jobs: u32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the total number of samples
    pub fn iterations(mut self, n_iter: u64) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Run on `executor`
    pub fn run<E>(&self, executor: &E, log: &LogSink) -> Result<f64, IntegrateError>
    where
        E: TaskExecutor + ?Sized,
    {
        integrate(
            &self.integrand,
            self.a,
            self.b,
            executor,
            self.n_jobs,
            self.n_iter,
            log,
        )
    }
}

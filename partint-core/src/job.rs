//! One sub-interval of an integration.

use crate::error::{ExecutorError, JobError};
use crate::integrand::Integrand;
use crate::log::{JobEvent, LogSink, Timestamp};
use partint_ipc::JobSpec;
use std::any::Any;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Immutable description of the work assigned to one job: the samples
/// `i_from..i_to` of the rectangle rule `f(a + i*step) * step`.
#[derive(Debug, Clone)]
pub struct IntegrationJob {
    integrand: Integrand,
    a: f64,
    step: f64,
    range: Range<u64>,
    job_id: u32,
}

impl IntegrationJob {
    /// Describe job `job_id` over `range`
    pub fn new(integrand: Integrand, a: f64, step: f64, range: Range<u64>, job_id: u32) -> Self {
        Self {
            integrand,
            a,
            step,
            range,
            job_id,
        }
    }

    /// Partition index
    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    /// Function being integrated
    pub fn integrand(&self) -> &Integrand {
        &self.integrand
    }

    /// Sample indices assigned to this job
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    /// Lower bound of the whole domain
    pub fn lower_bound(&self) -> f64 {
        self.a
    }

    /// Step width
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Compute the partial sum.
    ///
    /// Samples are visited in increasing index order. A panic inside the
    /// integrand is caught and returned as [`JobError::Panicked`]; a NaN or
    /// infinite sample value stops the job with [`JobError::NonFinite`].
    pub fn evaluate(&self) -> Result<f64, JobError> {
        catch_unwind(AssertUnwindSafe(|| self.accumulate())).unwrap_or_else(|payload| {
            Err(JobError::Panicked {
                job_id: self.job_id,
                message: panic_message(payload.as_ref()),
            })
        })
    }

    fn accumulate(&self) -> Result<f64, JobError> {
        let mut acc = 0.0;
        for i in self.range.clone() {
            let x = self.a + i as f64 * self.step;
            let value = self.integrand.eval(x);
            if !value.is_finite() {
                return Err(JobError::NonFinite {
                    job_id: self.job_id,
                    index: i,
                    x,
                    value,
                });
            }
            acc += value * self.step;
        }
        Ok(acc)
    }

    /// Worker routine: log `starts`, evaluate, log `ends`.
    ///
    /// The `ends` line is only written when the job succeeds.
    pub fn run(&self, log: &LogSink) -> Result<f64, JobError> {
        log.record(JobEvent::Started {
            job_id: self.job_id,
            at: Timestamp::now(),
        });
        let partial = self.evaluate()?;
        log.record(JobEvent::Ended {
            job_id: self.job_id,
            at: Timestamp::now(),
        });
        Ok(partial)
    }

    /// Wire form of this job. Fails for closures that have no registry name.
    pub fn to_spec(&self, task_id: u64) -> Result<JobSpec, ExecutorError> {
        if !self.integrand.is_transferable() {
            return Err(ExecutorError::NotTransferable(
                self.integrand.name().to_string(),
            ));
        }
        Ok(JobSpec {
            task_id,
            job_id: self.job_id,
            integrand: self.integrand.name().to_string(),
            a: self.a,
            step: self.step,
            i_from: self.range.start,
            i_to: self.range.end,
        })
    }

    /// Rebuild a job received from a supervisor
    pub fn from_spec(spec: &JobSpec) -> Result<Self, JobError> {
        let integrand =
            Integrand::named(&spec.integrand).map_err(|_| JobError::UnknownIntegrand {
                job_id: spec.job_id,
                name: spec.integrand.clone(),
            })?;
        Ok(Self::new(
            integrand,
            spec.a,
            spec.step,
            spec.i_from..spec.i_to,
            spec.job_id,
        ))
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

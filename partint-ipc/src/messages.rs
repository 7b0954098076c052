//! IPC Message Types
//!
//! Everything that crosses the supervisor/worker boundary. All types derive
//! rkyv with `check_bytes` so frames are validated before they are trusted.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// One sub-interval of an integration, in transferable form.
///
/// The integrand travels by registry name; the worker resolves it against
/// its own registry.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct JobSpec {
    /// Supervisor-assigned identifier, unique within one pool
    pub task_id: u64,
    /// Position of this job among the partitions of one integration
    pub job_id: u32,
    /// Registered integrand name
    pub integrand: String,
    /// Lower bound of the whole domain
    pub a: f64,
    /// Width of one sample step
    pub step: f64,
    /// First sample index (inclusive)
    pub i_from: u64,
    /// Last sample index (exclusive)
    pub i_to: u64,
}

impl JobSpec {
    /// Number of samples this job evaluates
    pub fn len(&self) -> u64 {
        self.i_to.saturating_sub(self.i_from)
    }

    /// Whether the job covers no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Categories of job failures reported by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The integrand panicked (caught)
    Panic,
    /// The integrand produced NaN or an infinity
    NonFinite,
    /// The worker has no integrand registered under the requested name
    UnknownIntegrand,
    /// The worker process went away before reporting
    WorkerLost,
}

/// Worker capabilities advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Worker process id
    pub pid: u32,
    /// Number of logical CPUs visible to the worker
    pub cpu_count: u32,
    /// Integrands the worker can resolve by name
    pub integrands: Vec<String>,
}

impl WorkerCapabilities {
    /// Capabilities of the current process with the given integrand names
    pub fn current(integrands: Vec<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            cpu_count: num_cpus(),
            integrands,
        }
    }

    /// Whether the worker can resolve `name`
    pub fn supports(&self, name: &str) -> bool {
        self.integrands.iter().any(|n| n == name)
    }
}

/// Messages sent from Worker to Supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake with worker capabilities
    Hello(WorkerCapabilities),

    /// A job began computing
    JobStarted {
        /// Task the event belongs to
        task_id: u64,
        /// Partition index of the job
        job_id: u32,
        /// Unix time in microseconds, taken in the worker
        timestamp_micros: i64,
    },

    /// A job finished with a partial sum
    JobFinished {
        /// Task the result belongs to
        task_id: u64,
        /// Partition index of the job
        job_id: u32,
        /// Partial sum over the job's index range
        partial_sum: f64,
        /// Unix time in microseconds, taken in the worker
        timestamp_micros: i64,
    },

    /// A job failed
    JobFailed {
        /// Task the failure belongs to
        task_id: u64,
        /// Partition index of the job
        job_id: u32,
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

/// Commands sent from Supervisor to Worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Compute one job
    Run(JobSpec),

    /// Request graceful shutdown
    Shutdown,
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(i_from: u64, i_to: u64) -> JobSpec {
        JobSpec {
            task_id: 7,
            job_id: 1,
            integrand: "cos".to_string(),
            a: 0.0,
            step: 0.5,
            i_from,
            i_to,
        }
    }

    #[test]
    fn test_job_spec_len() {
        assert_eq!(spec(10, 25).len(), 15);
        assert!(spec(4, 4).is_empty());
        // inverted ranges never underflow
        assert_eq!(spec(9, 3).len(), 0);
    }

    #[test]
    fn test_capabilities_current() {
        let caps = WorkerCapabilities::current(vec!["cos".into(), "sin".into()]);
        assert_eq!(caps.protocol_version, crate::PROTOCOL_VERSION);
        assert_eq!(caps.pid, std::process::id());
        assert!(caps.cpu_count >= 1);
        assert!(caps.supports("sin"));
        assert!(!caps.supports("tan"));
    }
}

#![warn(missing_docs)]
//! # partint
//!
//! Partitioned numerical integration with interchangeable executors.
//!
//! The left Riemann sum of `f` over `[a, b)` with `n_iter` samples is split
//! into `n_jobs` contiguous index ranges. Each range is an independent job
//! and the partial sums are added back in job order. The same computation
//! runs on:
//!
//! - **SequentialExecutor**: the caller's thread, one job after another
//! - **ThreadPoolExecutor**: a rayon pool sharing memory with the caller
//! - **ProcessPoolExecutor**: isolated worker processes speaking rkyv over
//!   pipes; integrands travel by registered name
//!
//! Every job can append `starts` / `ends` lines to a shared [`LogTarget`],
//! and the `partint` binary times a sweep of job counts across executors.
//!
//! ## Quick Start
//!
//! ```ignore
//! use partint::prelude::*;
//!
//! let cos = Integrand::named("cos")?;
//! let pool = ThreadPoolExecutor::new(4)?;
//! let value = integrate(&cos, 0.0, std::f64::consts::FRAC_PI_2, &pool, 4, 1_000_000, &LogSink::none())?;
//! assert!((value - 1.0).abs() < 1e-3);
//! ```
//!
//! ## Custom Integrands
//!
//! Closures work on the in-process executors. To run on worker processes a
//! function must be registered, so workers can look it up by name:
//!
//! ```ignore
//! fn gaussian(x: f64) -> f64 {
//!     (-x * x).exp()
//! }
//! partint::register_integrand!("gaussian", "exp(-x^2)", gaussian);
//!
//! fn main() -> anyhow::Result<()> {
//!     partint::run()
//! }
//! ```

// Re-export core types
pub use partint_core::{
    ExecutorError, ExecutorKind, FileLog, IntegrandDef, Integrand, IntegrateError,
    IntegrationJob, IntegrationRequest, JobError, JobEvent, JobHandle, LogSink, LogTarget,
    MemoryLog, SequentialExecutor, TaskExecutor, ThreadPoolExecutor, Timestamp, UnknownIntegrand,
    integrate, job_range, lookup, partition, register_integrand, registered_integrands,
    registered_names,
};

// Re-export report types
pub use partint_report::{RunOutcome, RunRecord, SweepReport};

// Re-export the harness
pub use partint_cli::{
    HarnessConfig, ProcessPoolExecutor, SupervisorError, SweepPlan, run_sweep,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ExecutorKind, FileLog, Integrand, LogSink, LogTarget, ProcessPoolExecutor,
        SequentialExecutor, TaskExecutor, ThreadPoolExecutor, integrate,
    };
}

/// Run the partint CLI.
///
/// Call this from a binary's `main()`; it also handles the hidden
/// `--worker` mode used by [`ProcessPoolExecutor`]:
/// ```ignore
/// fn main() {
///     partint::run().unwrap();
/// }
/// ```
pub use partint_cli::run;

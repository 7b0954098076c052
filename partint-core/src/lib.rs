#![warn(missing_docs)]
//! partint Core
//!
//! Partitioned numerical integration:
//! - [`integrate`] splits `[0, n_iter)` into `n_jobs` contiguous ranges and
//!   sums the partial results returned by a [`TaskExecutor`]
//! - sequential and thread-pool executors (the process pool lives in
//!   `partint-cli`)
//! - [`LogTarget`]s receiving whole-line `starts` / `ends` progress events
//! - the integrand registry that lets worker processes rebuild a function
//!   from its name
//! - [`WorkerMain`], the worker-process side of the process pool

mod error;
mod executor;
mod integrand;
mod integrate;
mod job;
mod log;
mod partition;
mod worker;

pub use error::{ExecutorError, IntegrateError, JobError, UnknownIntegrand};
pub use executor::{
    ExecutorKind, JobCompleter, JobHandle, SequentialExecutor, TaskExecutor, ThreadPoolExecutor,
};
pub use integrand::{Integrand, IntegrandDef, lookup, registered_integrands, registered_names};
pub use integrate::{IntegrationRequest, integrate};
pub use job::IntegrationJob;
pub use log::{FileLog, JobEvent, LogSink, LogTarget, MemoryLog, Timestamp};
pub use partition::{job_range, partition};
pub use worker::WorkerMain;

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use inventory;
}

/// Register a function under a name so worker processes can resolve it.
///
/// ```ignore
/// fn gaussian(x: f64) -> f64 {
///     (-x * x).exp()
/// }
///
/// partint_core::register_integrand!("gaussian", "exp(-x^2)", gaussian);
/// ```
#[macro_export]
macro_rules! register_integrand {
    ($name:literal, $func:expr) => {
        $crate::register_integrand!($name, "", $func);
    };
    ($name:literal, $description:literal, $func:expr) => {
        $crate::internal::inventory::submit! {
            $crate::IntegrandDef {
                name: $name,
                description: $description,
                func: $func,
            }
        }
    };
}

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || for _ in inventory::iter::<IntegrandDef> {};

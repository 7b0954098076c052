//! Plain-text results file and progress-log lines.
//!
//! The results file holds one record per configuration:
//!
//! ```text
//! ThreadPoolExecutor, 4 jobs:
//! Time: 0.2153
//! ```

use crate::report::{RunOutcome, RunRecord};
use partint_core::ExecutorKind;

/// First line of a freshly truncated log or results file
pub const START_MARKER: &str = "-------START-------";

/// Progress-log header written before a configuration runs
pub fn config_header(executor: ExecutorKind, jobs: u32) -> String {
    format!("{}, {} jobs", executor, jobs)
}

/// Progress-log lines written after a configuration finished
pub fn outcome_lines(run: &RunRecord) -> Vec<String> {
    match &run.outcome {
        RunOutcome::Completed { value } => vec![
            format!("Result: {}", value),
            format!("Time:   {}", run.elapsed_secs),
        ],
        RunOutcome::Failed { message } => vec![
            format!("FAILED: {}", message),
            format!("Time:   {}", run.elapsed_secs),
        ],
    }
}

/// Results-file record for one configuration
pub fn results_record(run: &RunRecord) -> String {
    let header = format!("{}:", config_header(run.executor, run.jobs));
    match &run.outcome {
        RunOutcome::Completed { .. } => format!("{}\nTime: {}", header, run.elapsed_secs),
        RunOutcome::Failed { message } => format!("{}\nFAILED: {}", header, message),
    }
}

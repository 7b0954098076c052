//! Report Data Structures

use chrono::{DateTime, Utc};
use partint_core::ExecutorKind;
use serde::{Deserialize, Serialize};

/// Complete record of one sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub meta: ReportMeta,
    pub integral: IntegralInfo,
    pub runs: Vec<RunRecord>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub host: HostInfo,
}

/// Machine the sweep ran on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub available_parallelism: usize,
}

/// The integral every configuration computed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegralInfo {
    pub function: String,
    /// Bound expressions as written in the configuration
    pub lower_expr: String,
    pub upper_expr: String,
    pub lower: f64,
    pub upper: f64,
    pub iterations: u64,
}

/// One `(executor, jobs)` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub executor: ExecutorKind,
    pub jobs: u32,
    /// Wall-clock time of the `integrate` call, in seconds
    pub elapsed_secs: f64,
    pub outcome: RunOutcome,
}

/// Result of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { value: f64 },
    Failed { message: String },
}

impl RunRecord {
    /// Integral estimate, if the run succeeded
    pub fn value(&self) -> Option<f64> {
        match self.outcome {
            RunOutcome::Completed { value } => Some(value),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// Whether the run failed
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }
}

impl SweepReport {
    /// Empty report for `integral`
    pub fn new(meta: ReportMeta, integral: IntegralInfo) -> Self {
        Self {
            meta,
            integral,
            runs: Vec::new(),
        }
    }

    /// Executor kinds in the order they first appear
    pub fn executors(&self) -> Vec<ExecutorKind> {
        let mut kinds = Vec::new();
        for run in &self.runs {
            if !kinds.contains(&run.executor) {
                kinds.push(run.executor);
            }
        }
        kinds
    }

    /// Speedup of `run` relative to the fewest-jobs successful run of the
    /// same executor kind (`> 1.0` = faster).
    pub fn speedup(&self, run: &RunRecord) -> Option<f64> {
        if run.is_failure() || run.elapsed_secs <= 0.0 {
            return None;
        }
        let baseline = self
            .runs
            .iter()
            .filter(|r| r.executor == run.executor && !r.is_failure())
            .min_by_key(|r| r.jobs)?;
        Some(baseline.elapsed_secs / run.elapsed_secs)
    }

    /// Fastest successful run of each executor kind
    pub fn fastest(&self) -> Vec<&RunRecord> {
        self.executors()
            .into_iter()
            .filter_map(|kind| {
                self.runs
                    .iter()
                    .filter(|r| r.executor == kind && !r.is_failure())
                    .min_by(|a, b| a.elapsed_secs.total_cmp(&b.elapsed_secs))
            })
            .collect()
    }

    /// Number of failed configurations
    pub fn failures(&self) -> usize {
        self.runs.iter().filter(|r| r.is_failure()).count()
    }
}

#![warn(missing_docs)]
//! partint Report - Sweep Results
//!
//! Output of a benchmark sweep:
//! - plain-text results file and progress-log lines
//! - JSON (machine-readable, includes host metadata)
//! - human-readable terminal table

mod formatting;
mod json;
mod report;
mod results;

pub use formatting::format_human_output;
pub use json::{SCHEMA_VERSION, generate_json_report, parse_json_report};
pub use report::{HostInfo, IntegralInfo, ReportMeta, RunOutcome, RunRecord, SweepReport};
pub use results::{START_MARKER, config_header, outcome_lines, results_record};

//! Output Formatting
//!
//! Terminal summary of a sweep: one table row per configuration with the
//! estimate, its error against a reference value when one is known, the
//! wall-clock time and the speedup over the single-job run of the same
//! executor.

use crate::report::{RunOutcome, SweepReport};

/// Format a report for terminal display.
///
/// `reference` is the exact value of the integral, if known.
pub fn format_human_output(report: &SweepReport, reference: Option<f64>) -> String {
    let mut output = String::new();
    let integral = &report.integral;

    output.push('\n');
    output.push_str("partint sweep\n");
    output.push_str(&"=".repeat(72));
    output.push('\n');
    output.push_str(&format!(
        "∫ {} over [{}, {}], {} samples on {} ({} threads available)\n\n",
        integral.function,
        integral.lower_expr,
        integral.upper_expr,
        integral.iterations,
        report.meta.host.cpu,
        report.meta.host.available_parallelism
    ));

    output.push_str(&format!(
        "  {:<20} {:>5}  {:>20}  {:>10}  {:>12}  {:>8}\n",
        "executor", "jobs", "result", "abs err", "time (s)", "speedup"
    ));
    output.push_str(&format!("  {}\n", "-".repeat(82)));

    for run in &report.runs {
        match &run.outcome {
            RunOutcome::Completed { value } => {
                let error = reference
                    .map(|r| format!("{:.2e}", (value - r).abs()))
                    .unwrap_or_else(|| "-".to_string());
                let speedup = report
                    .speedup(run)
                    .map(|s| format!("{:.2}x", s))
                    .unwrap_or_else(|| "-".to_string());
                output.push_str(&format!(
                    "  {:<20} {:>5}  {:>20.15}  {:>10}  {:>12.6}  {:>8}\n",
                    run.executor.display_name(),
                    run.jobs,
                    value,
                    error,
                    run.elapsed_secs,
                    speedup
                ));
            }
            RunOutcome::Failed { message } => {
                output.push_str(&format!(
                    "  {:<20} {:>5}  FAILED: {}\n",
                    run.executor.display_name(),
                    run.jobs,
                    message
                ));
            }
        }
    }

    let fastest = report.fastest();
    if !fastest.is_empty() {
        output.push('\n');
        for run in fastest {
            output.push_str(&format!(
                "  fastest {}: {} jobs in {:.6} s\n",
                run.executor.display_name(),
                run.jobs,
                run.elapsed_secs
            ));
        }
    }

    let failures = report.failures();
    if failures > 0 {
        output.push_str(&format!("\n  {} configuration(s) failed\n", failures));
    }

    output
}

//! System Metadata Collection
//!
//! Host information recorded in the JSON report. The CPU model comes from
//! `/proc/cpuinfo` and degrades to "Unknown" on other platforms.

use chrono::Utc;
use partint_report::{HostInfo, ReportMeta, SCHEMA_VERSION};

/// Build report metadata for a sweep starting now
pub fn build_report_meta() -> ReportMeta {
    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        host: host_info(),
    }
}

/// Describe the current machine
pub fn host_info() -> HostInfo {
    HostInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpu: get_cpu_model().unwrap_or_else(|| "Unknown".to_string()),
        available_parallelism: available_parallelism(),
    }
}

/// Get CPU model name from /proc/cpuinfo (Linux only)
fn get_cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

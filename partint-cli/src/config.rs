//! Configuration loading from partint.toml
//!
//! The sweep can be configured with a `partint.toml` file. It is discovered
//! by walking up from the current directory; `--config` overrides discovery.

use crate::bounds;
use partint_core::ExecutorKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the discovered configuration file
pub const CONFIG_FILE: &str = "partint.toml";

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid bound `{expr}`: {message}")]
    Bound { expr: String, message: String },

    #[error("Invalid duration: {0}")]
    Duration(String),

    #[error("Invalid sweep: {0}")]
    Sweep(String),
}

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// The integral to compute
    #[serde(default)]
    pub integral: IntegralConfig,
    /// Which configurations to time
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Where to write results
    #[serde(default)]
    pub output: OutputConfig,
}

/// Integral configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegralConfig {
    /// Registered integrand name
    #[serde(default = "default_function")]
    pub function: String,
    /// Lower bound expression, e.g. "0"
    #[serde(default = "default_lower")]
    pub lower: String,
    /// Upper bound expression, e.g. "pi / 2"
    #[serde(default = "default_upper")]
    pub upper: String,
    /// Total number of samples
    #[serde(default = "default_iterations")]
    pub iterations: u64,
}

impl Default for IntegralConfig {
    fn default() -> Self {
        Self {
            function: default_function(),
            lower: default_lower(),
            upper: default_upper(),
            iterations: default_iterations(),
        }
    }
}

fn default_function() -> String {
    "cos".to_string()
}
fn default_lower() -> String {
    "0".to_string()
}
fn default_upper() -> String {
    "pi / 2".to_string()
}
fn default_iterations() -> u64 {
    10_000_000
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Smallest job count
    #[serde(default = "default_min_jobs")]
    pub min_jobs: u32,
    /// Largest job count, inclusive (default: twice the available parallelism,
    /// one more than a half-open `1..2n` sweep would run)
    #[serde(default)]
    pub max_jobs: Option<u32>,
    /// Executor kinds timed at every job count, in order
    #[serde(default = "default_executors")]
    pub executors: Vec<ExecutorKind>,
    /// Record failing configurations and continue instead of aborting
    #[serde(default)]
    pub keep_going: bool,
    /// Time allowed for a worker process to start (e.g. "60s")
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_jobs: default_min_jobs(),
            max_jobs: None,
            executors: default_executors(),
            keep_going: false,
            worker_timeout: default_worker_timeout(),
        }
    }
}

fn default_min_jobs() -> u32 {
    1
}
fn default_executors() -> Vec<ExecutorKind> {
    vec![ExecutorKind::Thread, ExecutorKind::Process]
}
fn default_worker_timeout() -> String {
    "60s".to_string()
}

impl SweepConfig {
    /// Job counts to run, `min_jobs..=max_jobs`.
    pub fn job_counts(&self) -> Result<std::ops::RangeInclusive<u32>, ConfigError> {
        let max = self.max_jobs.unwrap_or_else(default_max_jobs);
        if self.min_jobs == 0 {
            return Err(ConfigError::Sweep("min_jobs must be at least 1".to_string()));
        }
        if max < self.min_jobs {
            return Err(ConfigError::Sweep(format!(
                "max_jobs ({}) is below min_jobs ({})",
                max, self.min_jobs
            )));
        }
        Ok(self.min_jobs..=max)
    }

    /// Handshake timeout for worker processes
    pub fn worker_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.worker_timeout)
    }
}

fn default_max_jobs() -> u32 {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (parallelism * 2).min(u32::MAX as usize) as u32
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding every output file
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Progress log, one line per job event
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Timing records, one per configuration
    #[serde(default = "default_results_file")]
    pub results_file: String,
    /// Also write results.json
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            log_file: default_log_file(),
            results_file: default_results_file(),
            json: default_json(),
        }
    }
}

fn default_output_dir() -> String {
    "artifacts".to_string()
}
fn default_log_file() -> String {
    "integrate_log.txt".to_string()
}
fn default_results_file() -> String {
    "integrate_results.txt".to_string()
}
fn default_json() -> bool {
    true
}

impl OutputConfig {
    /// Full path of the progress log
    pub fn log_path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.log_file)
    }

    /// Full path of the results file
    pub fn results_path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.results_file)
    }

    /// Full path of the JSON report
    pub fn json_path(&self) -> PathBuf {
        Path::new(&self.directory).join("results.json")
    }
}

impl IntegralConfig {
    /// Evaluated `(lower, upper)` bounds
    pub fn bounds(&self) -> Result<(f64, f64), ConfigError> {
        Ok((eval_bound(&self.lower)?, eval_bound(&self.upper)?))
    }
}

fn eval_bound(expr: &str) -> Result<f64, ConfigError> {
    bounds::evaluate(expr).map_err(|e| ConfigError::Bound {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Find `partint.toml` by walking up from the current directory
    pub fn discover() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# partint configuration

[integral]
# Registered integrand (see `partint list`)
function = "cos"
# Bounds are expressions; pi, tau and e are available
lower = "0"
upper = "pi / 2"
# Total number of samples
iterations = 10000000

[sweep]
# Job counts min_jobs..=max_jobs are timed
min_jobs = 1
# Defaults to twice the available parallelism (uncomment to fix)
# max_jobs = 16
# Executors timed at each job count: "sequential", "thread", "process"
executors = ["thread", "process"]
# Record failing configurations and continue
keep_going = false
# Time allowed for a worker process to start
worker_timeout = "60s"

[output]
# Directory for every output file
directory = "artifacts"
# Progress log (job start/end lines)
log_file = "integrate_log.txt"
# Timing records
results_file = "integrate_results.txt"
# Also write results.json
json = true
"#
        .to_string()
    }
}

/// Parse duration string (e.g., "3s", "500ms", "2m")
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::Duration("empty duration string".to_string()));
    }

    // Find where the number ends and unit begins
    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .trim()
        .parse()
        .map_err(|_| ConfigError::Duration(format!("invalid number: {}", num_part)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Duration(format!("out of range: {}", s)));
    }

    let secs_per_unit = match unit_part.to_lowercase().as_str() {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" | "" => 1.0,
        "m" | "min" => 60.0,
        _ => {
            return Err(ConfigError::Duration(format!(
                "unknown unit: {}",
                unit_part
            )));
        }
    };

    Ok(Duration::from_secs_f64(value * secs_per_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.integral.function, "cos");
        assert_eq!(config.integral.iterations, 10_000_000);
        assert_eq!(config.sweep.min_jobs, 1);
        assert_eq!(
            config.sweep.executors,
            vec![ExecutorKind::Thread, ExecutorKind::Process]
        );
        assert!(!config.sweep.keep_going);
        assert_eq!(
            config.output.results_path(),
            Path::new("artifacts").join("integrate_results.txt")
        );
    }

    #[test]
    fn test_default_toml_matches_defaults() {
        let config: HarnessConfig = toml::from_str(&HarnessConfig::default_toml()).unwrap();
        assert_eq!(config.integral.upper, "pi / 2");
        assert_eq!(config.sweep.max_jobs, None);
        assert_eq!(config.output.log_file, "integrate_log.txt");
        assert!(config.output.json);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [integral]
            function = "exp"
            upper = "1"
            iterations = 5000

            [sweep]
            max_jobs = 3
            executors = ["sequential", "thread"]
        "#;

        let config: HarnessConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.integral.function, "exp");
        assert_eq!(config.integral.iterations, 5000);
        assert_eq!(config.integral.bounds().unwrap(), (0.0, 1.0));
        assert_eq!(config.sweep.job_counts().unwrap(), 1..=3);
        assert_eq!(
            config.sweep.executors,
            vec![ExecutorKind::Sequential, ExecutorKind::Thread]
        );
        // Defaults should still apply
        assert_eq!(config.output.directory, "artifacts");
    }

    #[test]
    fn test_unknown_executor_rejected() {
        let result: Result<HarnessConfig, _> = toml::from_str("[sweep]\nexecutors = [\"gpu\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_job_counts_validation() {
        let mut sweep = SweepConfig {
            min_jobs: 4,
            max_jobs: Some(2),
            ..SweepConfig::default()
        };
        assert!(matches!(sweep.job_counts(), Err(ConfigError::Sweep(_))));

        sweep.min_jobs = 0;
        assert!(sweep.job_counts().is_err());

        sweep.min_jobs = 2;
        sweep.max_jobs = Some(2);
        assert_eq!(sweep.job_counts().unwrap(), 2..=2);

        sweep.max_jobs = None;
        assert!(sweep.job_counts().unwrap().end() >= &2);
    }

    #[test]
    fn test_default_max_jobs_is_inclusive() {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as u32;
        let counts = SweepConfig::default().job_counts().unwrap();
        assert_eq!(*counts.start(), 1);
        assert_eq!(*counts.end(), 2 * parallelism);
        assert_eq!(counts.count() as u32, 2 * parallelism);
    }

    #[test]
    fn test_bad_bound_expression() {
        let integral = IntegralConfig {
            upper: "pi / ".to_string(),
            ..IntegralConfig::default()
        };
        assert!(matches!(
            integral.bounds(),
            Err(ConfigError::Bound { expr, .. }) if expr == "pi / "
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = HarnessConfig::load("/nonexistent/partint.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[output]\ndirectory = \"out\"\njson = false\n").unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.output.directory, "out");
        assert!(!config.output.json);
    }
}

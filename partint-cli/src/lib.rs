#![warn(missing_docs)]
//! partint CLI Library
//!
//! Command-line front end for the partitioned integrator: the benchmark
//! sweep, single integrations, the process-pool supervisor and worker mode.
//! Any binary that calls [`run`] can serve as its own worker pool, because
//! the supervisor re-launches the current executable with `--worker`.
//!
//! # Example
//!
//! ```ignore
//! fn gaussian(x: f64) -> f64 {
//!     (-x * x).exp()
//! }
//! partint_core::register_integrand!("gaussian", "exp(-x^2)", gaussian);
//!
//! fn main() -> anyhow::Result<()> {
//!     partint_cli::run()
//! }
//! ```

mod bounds;
mod config;
mod metadata;
mod supervisor;
mod sweep;

pub use bounds::{BoundError, evaluate as evaluate_bound};
pub use config::*;
pub use metadata::{build_report_meta, host_info};
pub use supervisor::{ProcessPoolExecutor, SupervisorError};
pub use sweep::{SweepPlan, run_sweep};

use clap::{Parser, Subcommand};
use partint_core::{
    ExecutorKind, FileLog, Integrand, LogSink, SequentialExecutor, TaskExecutor,
    ThreadPoolExecutor, WorkerMain, integrate, registered_integrands,
};
use partint_report::format_human_output;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// partint command-line arguments
#[derive(Parser, Debug)]
#[command(name = "partint")]
#[command(
    author,
    version,
    about = "partint - partitioned numerical integration benchmark"
)]
pub struct Cli {
    /// Optional subcommand; defaults to Sweep
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (default: partint.toml found by walking up)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory, overrides [output].directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by supervisor)
    #[arg(long, hide = true)]
    pub worker: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Time every (jobs, executor) configuration
    Sweep(SweepArgs),

    /// Compute one integral and print the result
    Integrate {
        /// Registered integrand name
        #[arg(short, long, default_value = "cos")]
        function: String,

        /// Lower bound expression
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        lower: String,

        /// Upper bound expression
        #[arg(long, default_value = "pi / 2", allow_hyphen_values = true)]
        upper: String,

        /// Total number of samples
        #[arg(short = 'n', long, default_value = "1000")]
        iterations: u64,

        /// Number of jobs (and workers)
        #[arg(short, long, default_value = "1")]
        jobs: u32,

        /// Executor: sequential, thread or process
        #[arg(short, long, default_value = "thread")]
        executor: ExecutorKind,

        /// Append job progress lines to this file
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// List registered integrands
    List,

    /// Print a default partint.toml
    InitConfig,
}

/// Sweep overrides on top of partint.toml
#[derive(clap::Args, Debug, Default)]
pub struct SweepArgs {
    /// Smallest job count
    #[arg(long)]
    pub min_jobs: Option<u32>,

    /// Largest job count, inclusive
    #[arg(long)]
    pub max_jobs: Option<u32>,

    /// Executors to time, comma separated
    #[arg(long, value_delimiter = ',')]
    pub executors: Option<Vec<ExecutorKind>>,

    /// Total number of samples
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// Record failing configurations and continue
    #[arg(long)]
    pub keep_going: bool,

    /// Exact value of the integral, for the error column
    #[arg(long, allow_hyphen_values = true)]
    pub reference: Option<f64>,

    /// Skip writing results.json
    #[arg(long)]
    pub no_json: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Run the partint CLI, parsing arguments from the environment.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the partint CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Handle worker mode first (before any other initialization)
    if cli.worker {
        return run_worker_mode();
    }

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("partint=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("partint=info")
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Some(Commands::List) => list_integrands(),
        Some(Commands::InitConfig) => {
            print!("{}", HarnessConfig::default_toml());
            Ok(())
        }
        Some(Commands::Integrate {
            ref function,
            ref lower,
            ref upper,
            iterations,
            jobs,
            executor,
            ref log,
        }) => {
            let config = load_config(&cli)?;
            integrate_once(
                &config,
                function,
                (lower, upper),
                iterations,
                jobs,
                executor,
                log.as_deref(),
            )
        }
        Some(Commands::Sweep(ref args)) => run_sweep_command(&cli, args),
        None => run_sweep_command(&cli, &SweepArgs::default()),
    }
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::new();
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

/// `--config` wins, then discovery, then defaults
fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let path = cli.config.clone().or_else(HarnessConfig::discover);
    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            HarnessConfig::load(&path)?
        }
        None => HarnessConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.to_string_lossy().into_owned();
    }
    Ok(config)
}

fn run_sweep_command(cli: &Cli, args: &SweepArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if let Some(min_jobs) = args.min_jobs {
        config.sweep.min_jobs = min_jobs;
    }
    if args.max_jobs.is_some() {
        config.sweep.max_jobs = args.max_jobs;
    }
    if let Some(executors) = &args.executors {
        config.sweep.executors = executors.clone();
    }
    if let Some(iterations) = args.iterations {
        config.integral.iterations = iterations;
    }
    if args.keep_going {
        config.sweep.keep_going = true;
    }
    if args.no_json {
        config.output.json = false;
    }

    let plan = SweepPlan::from_config(&config)?;
    let report = run_sweep(&plan, &config.output, !args.no_progress)?;

    println!("{}", format_human_output(&report, args.reference));
    println!(
        "Results written to {}",
        config.output.results_path().display()
    );

    if report.failures() > 0 {
        anyhow::bail!("{} configuration(s) failed", report.failures());
    }
    Ok(())
}

fn integrate_once(
    config: &HarnessConfig,
    function: &str,
    (lower, upper): (&str, &str),
    iterations: u64,
    jobs: u32,
    kind: ExecutorKind,
    log: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let integrand = Integrand::named(function)?;
    let a = evaluate_bound(lower)?;
    let b = evaluate_bound(upper)?;

    let sink = match log {
        Some(path) => LogSink::to(Arc::new(FileLog::append(path)?)),
        None => LogSink::none(),
    };

    let workers = jobs.max(1) as usize;
    let started = Instant::now();
    let value = match kind {
        ExecutorKind::Sequential => integrate_on(
            &integrand,
            a,
            b,
            &SequentialExecutor::new(),
            jobs,
            iterations,
            &sink,
        )?,
        ExecutorKind::Thread => {
            let executor = ThreadPoolExecutor::new(workers)?;
            let value = integrate_on(&integrand, a, b, &executor, jobs, iterations, &sink);
            executor.shutdown();
            value?
        }
        ExecutorKind::Process => {
            let binary = std::env::current_exe()?;
            let executor = ProcessPoolExecutor::spawn_binary(
                binary,
                workers,
                config.sweep.worker_timeout()?,
            )?;
            let value = integrate_on(&integrand, a, b, &executor, jobs, iterations, &sink);
            executor.shutdown()?;
            value?
        }
    };
    let elapsed = started.elapsed();

    println!("Result: {}", value);
    println!("Time:   {}", elapsed.as_secs_f64());
    Ok(())
}

fn integrate_on(
    integrand: &Integrand,
    a: f64,
    b: f64,
    executor: &dyn TaskExecutor,
    jobs: u32,
    iterations: u64,
    sink: &LogSink,
) -> anyhow::Result<f64> {
    tracing::debug!(executor = %executor.kind(), jobs, iterations, "integrating");
    Ok(integrate(integrand, a, b, executor, jobs, iterations, sink)?)
}

/// List registered integrands
fn list_integrands() -> anyhow::Result<()> {
    let defs = registered_integrands();
    println!("Found {} integrands:\n", defs.len());
    for def in defs {
        if def.description.is_empty() {
            println!("  {}", def.name);
        } else {
            println!("  {:<12} {}", def.name, def.description);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sweep() {
        let cli = Cli::try_parse_from(["partint"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.worker);
    }

    #[test]
    fn test_worker_flag() {
        let cli = Cli::try_parse_from(["partint", partint_ipc::WORKER_FLAG]).unwrap();
        assert!(cli.worker);
    }

    #[test]
    fn test_sweep_overrides() {
        let cli = Cli::try_parse_from([
            "partint",
            "sweep",
            "--max-jobs",
            "4",
            "--executors",
            "sequential,process",
            "--keep-going",
            "--output-dir",
            "out",
        ])
        .unwrap();
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        match cli.command {
            Some(Commands::Sweep(args)) => {
                assert_eq!(args.max_jobs, Some(4));
                assert_eq!(
                    args.executors,
                    Some(vec![ExecutorKind::Sequential, ExecutorKind::Process])
                );
                assert!(args.keep_going);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_integrate_args() {
        let cli = Cli::try_parse_from([
            "partint",
            "integrate",
            "-f",
            "exp",
            "--lower",
            "-1",
            "--upper",
            "1",
            "-j",
            "3",
            "-e",
            "sequential",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Integrate {
                function,
                lower,
                jobs,
                executor,
                iterations,
                ..
            }) => {
                assert_eq!(function, "exp");
                assert_eq!(lower, "-1");
                assert_eq!(jobs, 3);
                assert_eq!(executor, ExecutorKind::Sequential);
                assert_eq!(iterations, 1000);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_executor_rejected() {
        assert!(Cli::try_parse_from(["partint", "integrate", "-e", "gpu"]).is_err());
    }
}

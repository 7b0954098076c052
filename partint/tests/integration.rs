//! Integration tests for partint
//!
//! These run the real `partint` binary as the process pool's worker, so
//! they exercise the full supervisor / worker round trip.

use partint::{
    ExecutorError, FileLog, Integrand, IntegrateError, JobError, LogSink, MemoryLog,
    ProcessPoolExecutor, SequentialExecutor, TaskExecutor, ThreadPoolExecutor, integrate,
};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::Duration;

const HANDSHAKE: Duration = Duration::from_secs(30);

fn process_pool(workers: usize) -> ProcessPoolExecutor {
    ProcessPoolExecutor::spawn_binary(env!("CARGO_BIN_EXE_partint"), workers, HANDSHAKE)
        .expect("failed to start process pool")
}

/// Same integral on every executor agrees, and is close to the exact value
#[test]
fn test_cross_executor_equivalence() {
    let cos = Integrand::named("cos").unwrap();
    let log = LogSink::none();

    let sequential = integrate(&cos, 0.0, FRAC_PI_2, &SequentialExecutor::new(), 4, 1000, &log)
        .unwrap();

    let threads = ThreadPoolExecutor::new(4).unwrap();
    let threaded = integrate(&cos, 0.0, FRAC_PI_2, &threads, 4, 1000, &log).unwrap();
    threads.shutdown();

    let pool = process_pool(4);
    let processed = integrate(&cos, 0.0, FRAC_PI_2, &pool, 4, 1000, &log).unwrap();
    pool.shutdown().unwrap();

    assert!((sequential - 1.0).abs() < 1e-3, "estimate {sequential}");
    // jobs are summed in order, so every executor gives the same bits
    assert_eq!(sequential.to_bits(), threaded.to_bits());
    assert_eq!(threaded.to_bits(), processed.to_bits());
}

/// Workers are separate processes
#[test]
fn test_workers_are_isolated_processes() {
    let pool = process_pool(2);
    assert_eq!(pool.workers(), 2);
    let pids = pool.pids();
    assert_eq!(pids.len(), 2);
    assert_ne!(pids[0], pids[1]);
    assert!(!pids.contains(&std::process::id()));
    pool.shutdown().unwrap();
}

/// More jobs than workers, and more jobs than samples
#[test]
fn test_process_pool_queues_jobs() {
    let one = Integrand::named("one").unwrap();
    let pool = process_pool(2);

    let value = integrate(&one, 0.0, 2.0, &pool, 7, 1000, &LogSink::none()).unwrap();
    assert!((value - 2.0).abs() < 1e-9);

    let value = integrate(&one, 0.0, 1.0, &pool, 16, 5, &LogSink::none()).unwrap();
    assert!((value - 1.0).abs() < 1e-9);

    pool.shutdown().unwrap();
}

/// A failing job in a worker surfaces from `integrate`
#[test]
fn test_process_failure_propagates() {
    let ln = Integrand::named("ln").unwrap();
    let pool = process_pool(2);

    // only job 0 samples x = 0
    let err = integrate(&ln, 0.0, 1.0, &pool, 4, 1000, &LogSink::none()).unwrap_err();
    match err {
        IntegrateError::Job(JobError::Remote { job_id, message, .. }) => {
            assert_eq!(job_id, 0);
            assert!(!message.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the pool is still usable afterwards
    let cos = Integrand::named("cos").unwrap();
    let value = integrate(&cos, 0.0, FRAC_PI_2, &pool, 2, 1000, &LogSink::none()).unwrap();
    assert!((value - 1.0).abs() < 1e-3);
    pool.shutdown().unwrap();
}

/// A worker killed mid-job fails that job, and the rest of the pool keeps working
#[test]
fn test_killed_worker_fails_pending_job() {
    let cos = Integrand::named("cos").unwrap();
    let pool = process_pool(2);
    assert_eq!(pool.workers(), 2);
    let victim = pool.pids()[0];

    // one job, dispatched to the first (least loaded) worker
    let killer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        unsafe { libc::kill(victim as libc::pid_t, libc::SIGKILL) };
    });
    let err = integrate(&cos, 0.0, 1.0, &pool, 1, 4_000_000_000, &LogSink::none()).unwrap_err();
    killer.join().unwrap();

    match err {
        IntegrateError::Job(JobError::WorkerLost { job_id, .. }) => assert_eq!(job_id, 0),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pool.workers(), 1);

    let value = integrate(&cos, 0.0, 1.0, &pool, 2, 1000, &LogSink::none()).unwrap();
    assert!((value - 1f64.sin()).abs() < 1e-3);
    pool.shutdown().unwrap();
}

/// Closures cannot be sent to another process
#[test]
fn test_closure_rejected_at_submission() {
    let offset = 3.0;
    let shifted = Integrand::from_fn("shifted", move |x| x + offset);
    let pool = process_pool(1);

    let err = integrate(&shifted, 0.0, 1.0, &pool, 2, 100, &LogSink::none()).unwrap_err();
    assert!(matches!(
        err,
        IntegrateError::Submission {
            job_id: 0,
            source: ExecutorError::NotTransferable(_)
        }
    ));

    // the same closure is fine in-process
    let value =
        integrate(&shifted, 0.0, 1.0, &SequentialExecutor::new(), 2, 1000, &LogSink::none())
            .unwrap();
    assert!((value - 3.5).abs() < 1e-2);
    pool.shutdown().unwrap();
}

/// Every job logs one start and one end line through the parent
#[test]
fn test_process_pool_logs_job_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integrate_log.txt");
    let log = Arc::new(FileLog::create(&path).unwrap());
    let sink = LogSink::to(log);

    let cos = Integrand::named("cos").unwrap();
    let pool = process_pool(3);
    integrate(&cos, 0.0, FRAC_PI_2, &pool, 6, 6000, &sink).unwrap();
    pool.shutdown().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 12);
    for job_id in 0..6 {
        assert!(lines.iter().any(|l| l.ends_with(&format!("] {job_id} starts"))));
        assert!(lines.iter().any(|l| l.ends_with(&format!("] {job_id} ends"))));
    }
    for line in &lines {
        assert!(line.starts_with('['), "malformed line: {line}");
    }
}

/// Thread pool writes the same set of lines to an in-memory target
#[test]
fn test_thread_pool_logs_job_events() {
    let log = Arc::new(MemoryLog::new());
    let sink = LogSink::to(log.clone());
    let sin = Integrand::named("sin").unwrap();
    let pool = ThreadPoolExecutor::new(4).unwrap();
    integrate(&sin, 0.0, 1.0, &pool, 8, 8000, &sink).unwrap();

    let lines = log.lines();
    assert_eq!(lines.iter().filter(|l| l.ends_with(" starts")).count(), 8);
    assert_eq!(lines.iter().filter(|l| l.ends_with(" ends")).count(), 8);
}

/// A shut-down pool refuses new work immediately
#[test]
fn test_shutdown_refuses_submissions() {
    let pool = ThreadPoolExecutor::new(2).unwrap();
    pool.shutdown();
    let cos = Integrand::named("cos").unwrap();
    let err = integrate(&cos, 0.0, 1.0, &pool, 2, 100, &LogSink::none()).unwrap_err();
    assert!(matches!(
        err,
        IntegrateError::Submission {
            source: ExecutorError::ShutDown,
            ..
        }
    ));
}

/// Dropping a pool without shutdown still reaps the workers
#[test]
fn test_drop_terminates_workers() {
    let pool = process_pool(2);
    let pids = pool.pids();
    drop(pool);
    for pid in pids {
        // signal 0 only checks existence; reaped children are gone
        let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
        assert!(!alive, "worker {pid} still running");
    }
}

//! Supervisor Process
//!
//! Process-backed [`TaskExecutor`]. Each worker is a copy of the current
//! binary started with `--worker`, connected through two pipes remapped to
//! fd 3 (commands) and fd 4 (messages).
//!
//! A reader thread per worker routes incoming messages by task id:
//! `JobStarted` / `JobFinished` become log lines on the submitting call's
//! [`LogSink`], results and failures complete the matching [`JobHandle`].
//! When a worker's message pipe closes, every job still routed to it fails
//! with [`JobError::WorkerLost`].

use fxhash::FxHashMap;
use partint_core::{
    ExecutorError, ExecutorKind, IntegrationJob, JobCompleter, JobError, JobEvent, JobHandle,
    LogSink, TaskExecutor, Timestamp,
};
use partint_ipc::{
    FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PROTOCOL_VERSION, SupervisorCommand,
    WORKER_FLAG, WorkerCapabilities, WorkerMessage,
};
use rayon::prelude::*;
use std::env;
use std::fs::File;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),

    #[error("Timeout waiting for worker handshake")]
    Timeout,

    #[error("Worker protocol error: expected {expected}, got {got}")]
    ProtocolError { expected: String, got: String },
}

impl From<SupervisorError> for ExecutorError {
    fn from(e: SupervisorError) -> Self {
        ExecutorError::Spawn(e.to_string())
    }
}

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: RawFd, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // a closing pipe may still hold a complete frame
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a pipe pair, returning (read_fd, write_fd), both close-on-exec.
///
/// Workers are spawned concurrently, so on Linux the flag is set atomically
/// to keep one child from inheriting another child's pipe ends.
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];

    #[cfg(target_os = "linux")]
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };

    #[cfg(not(target_os = "linux"))]
    let ret = unsafe {
        let ret = libc::pipe(fds.as_mut_ptr());
        if ret == 0 {
            for &fd in &fds {
                let flags = libc::fcntl(fd, libc::F_GETFD);
                libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
        ret
    };

    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

// Route tables and writers stay consistent across a panicking holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Where a dispatched task reports back to
struct Route {
    completer: JobCompleter,
    log: LogSink,
}

/// Tasks in flight on one worker. `alive` flips to false, under the same
/// lock, at the moment the reader drains the table, so no route can be
/// inserted after the drain.
struct RouteTable {
    alive: bool,
    routes: FxHashMap<u64, Route>,
}

/// One worker process and the thread reading its messages
struct WorkerProcess {
    index: usize,
    child: Child,
    writer: Mutex<FrameWriter<File>>,
    table: Arc<Mutex<RouteTable>>,
    reader: Option<JoinHandle<()>>,
    capabilities: WorkerCapabilities,
}

impl WorkerProcess {
    fn spawn(binary: &Path, index: usize, handshake: Duration) -> Result<Self, SupervisorError> {
        // cmd pipe: supervisor writes commands → worker reads from fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg pipe: worker writes messages to fd 4 → supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        // In the child: cmd_read → 3, msg_write → 4. Both are parked above
        // the target range first, since the pipe fds may themselves be 3..=6.
        unsafe {
            command.pre_exec(move || {
                let cmd = libc::fcntl(cmd_read, libc::F_DUPFD, 10);
                let msg = libc::fcntl(msg_write, libc::F_DUPFD, 10);
                if cmd < 0 || msg < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                for fd in [cmd_read, cmd_write, msg_read, msg_write] {
                    libc::close(fd);
                }
                if libc::dup2(cmd, 3) < 0 || libc::dup2(msg, 4) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                libc::close(cmd);
                libc::close(msg);
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        let writer_file = unsafe { File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { File::from_raw_fd(msg_read) };
        let mut reader = FrameReader::new(reader_file);

        let mut worker = Self {
            index,
            child,
            writer: Mutex::new(FrameWriter::new(writer_file)),
            table: Arc::new(Mutex::new(RouteTable {
                alive: true,
                routes: FxHashMap::default(),
            })),
            reader: None,
            capabilities: WorkerCapabilities::current(Vec::new()),
        };

        worker.capabilities = wait_for_hello(&mut reader, msg_read, handshake)?;

        let table = Arc::clone(&worker.table);
        let thread = std::thread::Builder::new()
            .name(format!("partint-ipc-{index}"))
            .spawn(move || reader_loop(index, reader, table))?;
        worker.reader = Some(thread);

        tracing::debug!(
            worker = index,
            pid = worker.capabilities.pid,
            integrands = worker.capabilities.integrands.len(),
            "worker ready"
        );
        Ok(worker)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn in_flight(&self) -> Option<usize> {
        let table = lock(&self.table);
        table.alive.then(|| table.routes.len())
    }

    fn dispatch(
        &self,
        job: &IntegrationJob,
        task_id: u64,
        log: LogSink,
    ) -> Result<JobHandle, ExecutorError> {
        let spec = job.to_spec(task_id)?;
        if !self.capabilities.supports(&spec.integrand) {
            return Err(ExecutorError::UnsupportedIntegrand(spec.integrand));
        }

        let (completer, handle) = JobHandle::pair(job.job_id());
        {
            let mut table = lock(&self.table);
            if !table.alive {
                return Err(ExecutorError::Dispatch(format!(
                    "worker {} exited",
                    self.index
                )));
            }
            table.routes.insert(task_id, Route { completer, log });
        }

        if let Err(e) = lock(&self.writer).send(&SupervisorCommand::Run(spec)) {
            lock(&self.table).routes.remove(&task_id);
            return Err(ExecutorError::Dispatch(e.to_string()));
        }
        Ok(handle)
    }

    /// Ask the worker to exit after its queued jobs, then reap it.
    fn shutdown(&mut self) -> Result<(), SupervisorError> {
        let sent = lock(&self.writer).send(&SupervisorCommand::Shutdown);
        if sent.is_err() && self.is_alive() {
            // cannot reach a live worker: fall back to the Drop path
            return sent.map_err(SupervisorError::from);
        }
        self.child.wait()?;
        if let Some(thread) = self.reader.take() {
            let _ = thread.join();
        }
        Ok(())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            // Graceful: SIGTERM first, brief wait, then SIGKILL
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
        }
        let _ = self.child.wait();
        if let Some(thread) = self.reader.take() {
            let _ = thread.join();
        }
    }
}

/// Read the worker's `Hello`, giving up after `timeout`.
fn wait_for_hello(
    reader: &mut FrameReader<File>,
    fd: RawFd,
    timeout: Duration,
) -> Result<WorkerCapabilities, SupervisorError> {
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    match wait_for_data(fd, timeout_ms) {
        PollResult::DataAvailable => {}
        PollResult::Timeout => return Err(SupervisorError::Timeout),
        PollResult::PipeClosed => {
            return Err(SupervisorError::Ipc(FrameError::EndOfStream));
        }
        PollResult::Error(e) => return Err(SupervisorError::SpawnFailed(e)),
    }

    match reader.recv::<WorkerMessage>()? {
        WorkerMessage::Hello(caps) => {
            if caps.protocol_version != PROTOCOL_VERSION {
                return Err(SupervisorError::ProtocolError {
                    expected: format!("protocol version {}", PROTOCOL_VERSION),
                    got: format!("protocol version {}", caps.protocol_version),
                });
            }
            Ok(caps)
        }
        other => Err(SupervisorError::ProtocolError {
            expected: "Hello".to_string(),
            got: format!("{:?}", other),
        }),
    }
}

/// Route worker messages until the pipe closes, then fail whatever is left.
fn reader_loop(index: usize, mut reader: FrameReader<File>, table: Arc<Mutex<RouteTable>>) {
    let reason = loop {
        match reader.recv::<WorkerMessage>() {
            Ok(WorkerMessage::JobStarted {
                task_id,
                job_id,
                timestamp_micros,
            }) => {
                let log = lock(&table).routes.get(&task_id).map(|r| r.log.clone());
                if let Some(log) = log {
                    log.record(JobEvent::Started {
                        job_id,
                        at: Timestamp::from_micros(timestamp_micros),
                    });
                }
            }
            Ok(WorkerMessage::JobFinished {
                task_id,
                job_id,
                partial_sum,
                timestamp_micros,
            }) => match lock(&table).routes.remove(&task_id) {
                Some(route) => {
                    route.log.record(JobEvent::Ended {
                        job_id,
                        at: Timestamp::from_micros(timestamp_micros),
                    });
                    route.completer.complete(Ok(partial_sum));
                }
                None => tracing::warn!(worker = index, task_id, "result for unknown task"),
            },
            Ok(WorkerMessage::JobFailed {
                task_id,
                job_id,
                kind,
                message,
            }) => match lock(&table).routes.remove(&task_id) {
                Some(route) => route.completer.complete(Err(JobError::Remote {
                    job_id,
                    kind,
                    message,
                })),
                None => tracing::warn!(worker = index, task_id, "failure for unknown task"),
            },
            Ok(WorkerMessage::Hello(_)) => {
                tracing::warn!(worker = index, "unexpected Hello after handshake");
            }
            Err(FrameError::EndOfStream) => break "worker exited".to_string(),
            Err(e) => break format!("IPC error: {}", e),
        }
    };

    let orphans = {
        let mut table = lock(&table);
        table.alive = false;
        std::mem::take(&mut table.routes)
    };
    if !orphans.is_empty() {
        tracing::warn!(worker = index, pending = orphans.len(), %reason, "worker lost with jobs in flight");
    }
    for (_, route) in orphans {
        let job_id = route.completer.job_id();
        route.completer.complete(Err(JobError::WorkerLost {
            job_id,
            reason: reason.clone(),
        }));
    }
}

/// Pool of isolated worker processes.
pub struct ProcessPoolExecutor {
    workers: Vec<WorkerProcess>,
    next_task: AtomicU64,
    closed: AtomicBool,
}

impl ProcessPoolExecutor {
    /// Default time allowed for a worker to say hello
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Start `workers` copies of the current executable.
    pub fn spawn(workers: usize) -> Result<Self, SupervisorError> {
        let binary = env::current_exe()?;
        Self::spawn_binary(binary, workers, Self::DEFAULT_HANDSHAKE_TIMEOUT)
    }

    /// Start `workers` copies of `binary`, which must enter worker mode on
    /// `--worker`.
    pub fn spawn_binary(
        binary: impl Into<PathBuf>,
        workers: usize,
        handshake: Duration,
    ) -> Result<Self, SupervisorError> {
        let binary = binary.into();
        let workers = workers.max(1);
        let processes = (0..workers)
            .into_par_iter()
            .map(|index| WorkerProcess::spawn(&binary, index, handshake))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(workers, binary = %binary.display(), "process pool started");
        Ok(Self {
            workers: processes,
            next_task: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Process ids of the workers
    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().map(|w| w.child.id()).collect()
    }

    /// Stop accepting jobs, let queued jobs finish, and reap every worker.
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        self.closed.store(true, Ordering::Release);
        let mut first_error = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.shutdown() {
                tracing::warn!(worker = worker.index, error = %e, "worker did not shut down cleanly");
                first_error.get_or_insert(e);
            }
        }
        // dropping the workers kills anything still running
        self.workers.clear();
        first_error.map_or(Ok(()), Err)
    }

    fn least_loaded(&self) -> Option<&WorkerProcess> {
        self.workers
            .iter()
            .filter_map(|w| w.in_flight().map(|n| (n, w)))
            .min_by_key(|(n, w)| (*n, w.index))
            .map(|(_, w)| w)
    }
}

impl TaskExecutor for ProcessPoolExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Process
    }

    fn workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.in_flight().is_some())
            .count()
    }

    fn submit(&self, job: IntegrationJob, log: LogSink) -> Result<JobHandle, ExecutorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecutorError::ShutDown);
        }
        if !job.integrand().is_transferable() {
            return Err(ExecutorError::NotTransferable(
                job.integrand().name().to_string(),
            ));
        }
        let worker = self.least_loaded().ok_or(ExecutorError::NoLiveWorkers)?;
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        worker.dispatch(&job, task_id, log)
    }
}

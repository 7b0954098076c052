//! Worker Process Entry Point
//!
//! The process side of the process pool. On Unix the supervisor passes a
//! pipe pair through `PARTINT_IPC_FD=<read>,<write>`; elsewhere, or when the
//! variable is missing, the worker talks over stdin/stdout.
//!
//! Jobs arrive one at a time. Each produces a `JobStarted` message followed
//! by `JobFinished` or `JobFailed`; the supervisor turns those into log
//! lines and handle completions.

use crate::error::JobError;
use crate::integrand::registered_names;
use crate::job::IntegrationJob;
use crate::log::Timestamp;
use partint_ipc::{
    FrameError, FrameReader, FrameWriter, IPC_FD_ENV, JobSpec, SupervisorCommand,
    WorkerCapabilities, WorkerMessage,
};
use std::io::{Read, Write};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// IPC transport: either an inherited fd pair or stdin/stdout.
enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn parse_fd_pair(value: &str) -> Option<(i32, i32)> {
    let (r, w) = value.split_once(',')?;
    Some((r.trim().parse().ok()?, w.trim().parse().ok()?))
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(value) = std::env::var(IPC_FD_ENV) {
        if let Some((read_fd, write_fd)) = parse_fd_pair(&value) {
            return IpcTransport::Fds { read_fd, write_fd };
        }
        eprintln!(
            "partint: warning: invalid {IPC_FD_ENV}={value:?} (expected <read_fd>,<write_fd>), falling back to stdio"
        );
    }
    IpcTransport::Stdio
}

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<Box<dyn Read>>,
    writer: FrameWriter<Box<dyn Write>>,
}

impl WorkerMain {
    /// Connect to the supervisor through the transport it set up.
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                // SAFETY: the supervisor dup'ed both ends onto these fds
                // before exec and nothing else in this process owns them.
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::with_io(Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => {
                Self::with_io(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
            }
        }
    }

    /// Worker over arbitrary streams
    pub fn with_io(reader: Box<dyn Read>, writer: Box<dyn Write>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Announce capabilities, then serve commands until `Shutdown` or the
    /// supervisor closes the pipe.
    pub fn run(&mut self) -> Result<(), FrameError> {
        self.writer
            .send(&WorkerMessage::Hello(WorkerCapabilities::current(
                registered_names(),
            )))?;

        loop {
            let command = match self.reader.recv::<SupervisorCommand>() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Run(spec) => self.run_job(&spec)?,
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }

    fn run_job(&mut self, spec: &JobSpec) -> Result<(), FrameError> {
        let job = match IntegrationJob::from_spec(spec) {
            Ok(job) => job,
            Err(e) => return self.send_failure(spec, &e),
        };

        self.writer.send(&WorkerMessage::JobStarted {
            task_id: spec.task_id,
            job_id: spec.job_id,
            timestamp_micros: Timestamp::now().as_micros(),
        })?;

        match job.evaluate() {
            Ok(partial_sum) => self.writer.send(&WorkerMessage::JobFinished {
                task_id: spec.task_id,
                job_id: spec.job_id,
                partial_sum,
                timestamp_micros: Timestamp::now().as_micros(),
            }),
            Err(e) => self.send_failure(spec, &e),
        }
    }

    fn send_failure(&mut self, spec: &JobSpec, error: &JobError) -> Result<(), FrameError> {
        self.writer.send(&WorkerMessage::JobFailed {
            task_id: spec.task_id,
            job_id: spec.job_id,
            kind: error.failure_kind(),
            message: error.to_string(),
        })
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partint_ipc::FailureKind;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Write half that stays readable after the worker is done with it
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn commands(cmds: &[SupervisorCommand]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for cmd in cmds {
                writer.send(cmd).unwrap();
            }
        }
        buffer
    }

    fn run_worker(cmds: &[SupervisorCommand]) -> Vec<WorkerMessage> {
        let out = SharedBuf::default();
        let mut worker =
            WorkerMain::with_io(Box::new(Cursor::new(commands(cmds))), Box::new(out.clone()));
        worker.run().unwrap();

        let bytes = out.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut messages = Vec::new();
        loop {
            match reader.recv::<WorkerMessage>() {
                Ok(msg) => messages.push(msg),
                Err(FrameError::EndOfStream) => break,
                Err(e) => panic!("bad frame: {e}"),
            }
        }
        messages
    }

    fn spec(task_id: u64, integrand: &str, i_from: u64, i_to: u64) -> JobSpec {
        JobSpec {
            task_id,
            job_id: task_id as u32,
            integrand: integrand.to_string(),
            a: 0.0,
            step: 0.5,
            i_from,
            i_to,
        }
    }

    #[test]
    fn test_parse_fd_pair() {
        assert_eq!(parse_fd_pair("3,4"), Some((3, 4)));
        assert_eq!(parse_fd_pair(" 10 , 11 "), Some((10, 11)));
        assert_eq!(parse_fd_pair("3"), None);
        assert_eq!(parse_fd_pair("a,b"), None);
    }

    #[test]
    fn test_hello_then_job() {
        let messages = run_worker(&[
            SupervisorCommand::Run(spec(1, "one", 0, 4)),
            SupervisorCommand::Shutdown,
        ]);
        assert_eq!(messages.len(), 3);

        match &messages[0] {
            WorkerMessage::Hello(caps) => assert!(caps.supports("cos")),
            other => panic!("expected Hello, got {:?}", other),
        }
        assert!(matches!(
            messages[1],
            WorkerMessage::JobStarted { task_id: 1, .. }
        ));
        match messages[2] {
            WorkerMessage::JobFinished {
                task_id,
                partial_sum,
                ..
            } => {
                assert_eq!(task_id, 1);
                assert_eq!(partial_sum, 2.0);
            }
            ref other => panic!("expected JobFinished, got {:?}", other),
        }
    }

    #[test]
    fn test_failures_are_reported_and_worker_continues() {
        let messages = run_worker(&[
            SupervisorCommand::Run(spec(1, "nope", 0, 1)),
            SupervisorCommand::Run(spec(2, "recip", 0, 2)),
            SupervisorCommand::Run(spec(3, "one", 0, 2)),
        ]);

        let kinds: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::JobFailed { task_id, kind, .. } => Some((*task_id, *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![(1, FailureKind::UnknownIntegrand), (2, FailureKind::NonFinite)]
        );
        assert!(matches!(
            messages.last(),
            Some(WorkerMessage::JobFinished { task_id: 3, .. })
        ));
    }
}

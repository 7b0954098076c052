//! Progress log targets.
//!
//! Every job of one integration writes `starts` / `ends` lines to the same
//! target. Lines from concurrent jobs interleave, but a line is always
//! written whole: implementations hold a lock for the full append.

use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Unix time with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    micros: i64,
}

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        Self {
            micros: Utc::now().timestamp_micros(),
        }
    }

    /// From microseconds since the Unix epoch
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Microseconds since the Unix epoch
    pub fn as_micros(self) -> i64 {
        self.micros
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.micros.div_euclid(1_000_000),
            self.micros.rem_euclid(1_000_000)
        )
    }
}

/// Progress event of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// The job is about to evaluate its first sample
    Started { job_id: u32, at: Timestamp },
    /// The job produced its partial sum
    Ended { job_id: u32, at: Timestamp },
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Started { job_id, at } => write!(f, "[{}] {} starts", at, job_id),
            JobEvent::Ended { job_id, at } => write!(f, "[{}] {} ends", at, job_id),
        }
    }
}

/// Appendable, line-oriented text destination shared between jobs.
pub trait LogTarget: Send + Sync {
    /// Append one line. `line` carries no trailing newline.
    fn append_line(&self, line: &str) -> io::Result<()>;
}

/// Log file opened in append mode; whole lines are written under a lock.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLog {
    /// Create or truncate `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        File::create(path.as_ref())?;
        Self::append(path)
    }

    /// Open `path` for appending, creating it if needed
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogTarget for FileLog {
    fn append_line(&self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut file = lock(&self.file);
        file.write_all(buf.as_bytes())?;
        file.flush()
    }
}

/// In-memory log, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all lines written so far
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl LogTarget for MemoryLog {
    fn append_line(&self, line: &str) -> io::Result<()> {
        lock(&self.lines).push(line.to_string());
        Ok(())
    }
}

// A panicking writer cannot leave a half-written line behind, so a poisoned
// lock is still safe to reuse.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Optional shared log target handed to every job of one call.
#[derive(Clone, Default)]
pub struct LogSink {
    target: Option<Arc<dyn LogTarget>>,
}

impl LogSink {
    /// Discard everything
    pub fn none() -> Self {
        Self { target: None }
    }

    /// Write to `target`
    pub fn to(target: Arc<dyn LogTarget>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Whether anything will be written
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Record a job event
    pub fn record(&self, event: JobEvent) {
        if self.target.is_some() {
            self.note(&event.to_string());
        }
    }

    /// Write a free-form line. Failures are reported through `tracing` and
    /// never abort the caller.
    pub fn note(&self, line: &str) {
        if let Some(target) = &self.target {
            if let Err(e) = target.append_line(line) {
                tracing::warn!(error = %e, "failed to append progress log line");
            }
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#![warn(missing_docs)]
//! partint IPC Protocol
//!
//! Wire format between the process-pool supervisor and its worker
//! processes. Messages are rkyv-serialized and sent as length-prefixed
//! frames over a pair of pipes.
//!
//! ```text
//! supervisor                         worker
//!     │  ◄──────── Hello(caps) ────────  │
//!     │  ──────── Run(JobSpec) ───────►  │
//!     │  ◄─────── JobStarted ──────────  │
//!     │  ◄─────── JobFinished/Failed ──  │
//!     │  ──────── Shutdown ───────────►  │
//! ```

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{FailureKind, JobSpec, SupervisorCommand, WorkerCapabilities, WorkerMessage};

/// Protocol version checked during the handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the worker's `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "PARTINT_IPC_FD";

/// Command-line flag that switches a binary into worker mode
pub const WORKER_FLAG: &str = "--worker";

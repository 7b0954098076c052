//! Length-Prefixed Frames
//!
//! Pipes are byte streams; every message is sent as
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```
//!
//! and validated with `check_archived_root` before it is deserialized.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{self, BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Largest payload accepted in either direction (1 MiB).
///
/// Job messages are a few dozen bytes; anything near this size is a
/// corrupted length prefix.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur while encoding or decoding frames
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Zero-length frame")]
    EmptyFrame,

    #[error("End of stream")]
    EndOfStream,
}

/// Serialize `message` and write it as one frame, then flush.
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it.
///
/// A clean end of stream before the length prefix is reported as
/// [`FrameError::EndOfStream`]; a stream that ends mid-frame is an I/O error.
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::EndOfStream),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    // rkyv needs an aligned buffer to validate in place
    let mut payload = AlignedVec::with_capacity(len);
    payload.resize(len, 0);
    reader.read_exact(&mut payload)?;

    let archived = rkyv::check_archived_root::<T>(&payload)
        .map_err(|e| FrameError::Validation(e.to_string()))?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Validation("deserialization failed".to_string()))
}

/// Buffered frame sink
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a raw writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(8 * 1024, writer),
        }
    }

    /// Write one message as a frame
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Buffered frame source
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a raw reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(8 * 1024, reader),
        }
    }

    /// Read the next message
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, JobSpec, SupervisorCommand, WorkerMessage};
    use std::io::Cursor;

    fn sample_spec() -> JobSpec {
        JobSpec {
            task_id: 3,
            job_id: 2,
            integrand: "cos".to_string(),
            a: 0.0,
            step: 1e-3,
            i_from: 500,
            i_to: 750,
        }
    }

    #[test]
    fn test_command_stream() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer.send(&SupervisorCommand::Run(sample_spec())).unwrap();
            writer.send(&SupervisorCommand::Shutdown).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.recv::<SupervisorCommand>().unwrap() {
            SupervisorCommand::Run(spec) => assert_eq!(spec, sample_spec()),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(matches!(
            reader.recv::<SupervisorCommand>().unwrap(),
            SupervisorCommand::Shutdown
        ));
        assert!(matches!(
            reader.recv::<SupervisorCommand>(),
            Err(FrameError::EndOfStream)
        ));
    }

    #[test]
    fn test_failure_message_survives() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer
                .send(&WorkerMessage::JobFailed {
                    task_id: 11,
                    job_id: 4,
                    kind: FailureKind::NonFinite,
                    message: "f(0) = -inf".to_string(),
                })
                .unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.recv::<WorkerMessage>().unwrap() {
            WorkerMessage::JobFailed {
                task_id,
                job_id,
                kind,
                message,
            } => {
                assert_eq!(task_id, 11);
                assert_eq!(job_id, 4);
                assert_eq!(kind, FailureKind::NonFinite);
                assert_eq!(message, "f(0) = -inf");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8, 0, 0, 0]));
        assert!(matches!(
            reader.recv::<SupervisorCommand>(),
            Err(FrameError::EmptyFrame)
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let len = (MAX_FRAME_SIZE as u32 + 1).to_le_bytes();
        let mut reader = FrameReader::new(Cursor::new(len.to_vec()));
        assert!(matches!(
            reader.recv::<SupervisorCommand>(),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut bytes = 64u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.recv::<SupervisorCommand>(),
            Err(FrameError::Io(_))
        ));
    }
}

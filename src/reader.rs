//! Deadline-bounded line reader.
//!
//! Wraps the read half of a connection and hands out one newline-terminated
//! message per call. Each underlying read attempt carries a short, renewed
//! deadline so a read never blocks indefinitely and the session loop can
//! periodically re-check the watchdog's termination flag.

use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time;

/// Deadline applied to each underlying read attempt.
pub const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Initial pending-buffer capacity.
const BUFFER_SIZE: usize = 4 * 1024;

/// Outcome of one [`DeadlineReader::read_line`] call.
#[derive(Debug)]
pub enum ReadEvent {
    /// A complete line, trailing newline included.
    Line(String),
    /// No new bytes arrived within the deadline window. Recoverable; the
    /// caller should re-check session state and call again.
    SoftTimeout,
    /// The peer closed the stream.
    Eof,
}

/// Buffered reader yielding newline-delimited messages.
pub struct DeadlineReader {
    stream: OwnedReadHalf,
    buffer: BytesMut,
}

impl DeadlineReader {
    /// Wrap the read half of a connection.
    pub fn new(stream: OwnedReadHalf) -> Self {
        DeadlineReader {
            stream,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
        }
    }

    /// Read one line, waiting at most [`READ_DEADLINE`] for new bytes.
    ///
    /// Pending bytes survive a `SoftTimeout` and are completed by a later
    /// call. An unterminated fragment at EOF is discarded. Any read fault
    /// other than the deadline elapsing is returned as a fatal error.
    pub async fn read_line(&mut self) -> io::Result<ReadEvent> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line = self.buffer.split_to(pos + 1);
                return Ok(ReadEvent::Line(
                    String::from_utf8_lossy(&line).into_owned(),
                ));
            }

            match time::timeout(READ_DEADLINE, self.stream.read_buf(&mut self.buffer)).await {
                Err(_) => return Ok(ReadEvent::SoftTimeout),
                Ok(Ok(0)) => return Ok(ReadEvent::Eof),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

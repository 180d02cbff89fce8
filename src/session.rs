//! Per-connection session handling.
//!
//! Each accepted connection runs two tasks: this handler driving the
//! read/dispatch loop, and a watchdog owning the inactivity deadline. They
//! coordinate only through the activity channel and a shared termination
//! flag; the stream's write half is shared so the watchdog can deliver its
//! expiry notice. Teardown happens on a single path regardless of how the
//! session ends.

use crate::audit::AuditLog;
use crate::config::Config;
use crate::protocol::{self, MAX_MESSAGE_BYTES};
use crate::reader::{DeadlineReader, ReadEvent};
use crate::watchdog::{self, SharedWriter, WatchdogHandle};
use chrono::Local;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Handle a single client connection from accept to teardown.
pub async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // An unavailable audit log aborts this session only; the caller logs it
    // and the server keeps accepting.
    let audit = AuditLog::create(&config.audit_dir, &peer).await?;

    let (read_half, write_half) = stream.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(write_half)));
    let expired = Arc::new(AtomicBool::new(false));
    let watchdog = watchdog::spawn(Arc::clone(&writer), Arc::clone(&expired), config.timeout());

    let mut session = Session {
        peer,
        reader: DeadlineReader::new(read_half),
        writer,
        expired,
        watchdog,
        audit,
    };

    let result = session.run().await;
    session.shutdown().await;
    result
}

/// One live session: exclusive owner of the stream and audit handle for its
/// lifetime (the watchdog's expiry write is the only exception).
struct Session {
    peer: SocketAddr,
    reader: DeadlineReader,
    writer: SharedWriter,
    expired: Arc<AtomicBool>,
    watchdog: WatchdogHandle,
    audit: AuditLog,
}

impl Session {
    /// Drive the read loop until a terminal condition.
    async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            if self.expired.load(Ordering::Acquire) {
                debug!(peer = %self.peer, "Session closed by inactivity timeout");
                return Ok(());
            }

            match self.reader.read_line().await {
                Ok(ReadEvent::SoftTimeout) => continue,
                Ok(ReadEvent::Eof) => {
                    trace!(peer = %self.peer, "Connection closed by client");
                    return Ok(());
                }
                Ok(ReadEvent::Line(raw)) => {
                    if !self.handle_line(&raw).await? {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Read error");
                    return Err(e.into());
                }
            }
        }
    }

    /// Process one received line. Returns `false` when the session should
    /// terminate.
    async fn handle_line(&mut self, raw: &str) -> io::Result<bool> {
        // Any parsed line counts as activity, including ones rejected below:
        // a client sending traffic is not inactive.
        self.watchdog.touch();

        let message = raw.trim();
        trace!(peer = %self.peer, message = %message, "Message received");

        // Oversized messages are rejected by the dispatcher and must never
        // reach the audit log.
        if message.len() <= MAX_MESSAGE_BYTES {
            if let Err(e) = self.audit.append(Local::now(), message).await {
                warn!(peer = %self.peer, error = %e, "Audit append failed");
            }
        }

        let reply = protocol::dispatch(message);
        self.write_reply(&reply.text).await?;
        Ok(!reply.terminate)
    }

    /// Write one response line and flush it to the peer.
    async fn write_reply(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    /// Single teardown path for every terminal condition. Dropping the
    /// watchdog handle closes the activity channel, stopping the watchdog;
    /// dropping the stream halves and audit handle releases them exactly
    /// once.
    async fn shutdown(self) {
        let _ = self.writer.lock().await.flush().await;
        drop(self.watchdog);
        debug!(peer = %self.peer, "Client disconnected");
    }
}

//! Per-session inactivity watchdog.
//!
//! Each session spawns one watchdog task owning a resettable deadline. The
//! session signals activity through a capacity-1 channel; only the most
//! recent reset matters, so bursts collapse into a single pending signal and
//! the sender never blocks. Closing the channel is the sole graceful-stop
//! signal. On expiry the watchdog writes a terminal notice best-effort,
//! shuts down the write half, and sets the shared termination flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Instant};
use tracing::debug;

/// Notice written to the peer when the inactivity deadline elapses.
pub const TIMEOUT_NOTICE: &str = "Connection timed out due to inactivity";

/// Write half of a session's stream, shared between the session handler and
/// its watchdog. The watchdog touches it only during the expiry transition.
pub type SharedWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Handle held by the session handler. Dropping it closes the activity
/// channel, which the watchdog treats as "stop without further action".
pub struct WatchdogHandle {
    activity: mpsc::Sender<()>,
}

impl WatchdogHandle {
    /// Signal activity, extending the inactivity deadline.
    ///
    /// Non-blocking: a signal already pending carries the same reset, and a
    /// watchdog that has expired ignores activity, so both send failures are
    /// dropped.
    pub fn touch(&self) {
        let _ = self.activity.try_send(());
    }
}

/// Spawn the watchdog task for one session.
///
/// The task runs until the activity channel closes (graceful session end) or
/// the deadline elapses. Expiry is terminal: it fires at most once, after
/// which the task exits and later activity signals have no effect.
pub fn spawn(
    writer: SharedWriter,
    expired: Arc<AtomicBool>,
    timeout: Duration,
) -> WatchdogHandle {
    let (tx, mut rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let sleep = time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                signal = rx.recv() => match signal {
                    Some(()) => sleep.as_mut().reset(Instant::now() + timeout),
                    // Channel closed: the session is tearing down on its own.
                    None => return,
                },
                () = &mut sleep => {
                    expired.store(true, Ordering::Release);
                    expire(&writer).await;
                    return;
                }
            }
        }
    });

    WatchdogHandle { activity: tx }
}

/// Expiry transition: best-effort notice to the peer, then force the stream
/// closed so the read loop observes termination.
async fn expire(writer: &SharedWriter) {
    debug!("Session expired due to inactivity");

    let mut writer = writer.lock().await;
    let notice = format!("{TIMEOUT_NOTICE}\n");
    let _ = writer.write_all(notice.as_bytes()).await;
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Error closing expired stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    async fn watchdog_pair(
        timeout: Duration,
    ) -> (TcpStream, SharedWriter, Arc<AtomicBool>, WatchdogHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (_read_half, write_half) = server.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(write_half)));
        let expired = Arc::new(AtomicBool::new(false));
        let handle = spawn(Arc::clone(&writer), Arc::clone(&expired), timeout);
        (client, writer, expired, handle)
    }

    #[tokio::test]
    async fn test_expiry_writes_notice_and_sets_flag() {
        let (client, _writer, expired, _handle) =
            watchdog_pair(Duration::from_millis(200)).await;

        let mut lines = BufReader::new(client).lines();
        let notice = time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.as_deref(), Some(TIMEOUT_NOTICE));
        assert!(expired.load(Ordering::Acquire));

        // Write half was shut down, so the stream ends after the notice.
        let eof = time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn test_activity_resets_deadline() {
        let (client, _writer, expired, handle) =
            watchdog_pair(Duration::from_millis(500)).await;

        // Keep touching at intervals shorter than the timeout for longer
        // than the timeout itself.
        for _ in 0..5 {
            time::sleep(Duration::from_millis(200)).await;
            handle.touch();
        }
        assert!(!expired.load(Ordering::Acquire));

        // Stop touching; the deadline must now elapse.
        let mut lines = BufReader::new(client).lines();
        let notice = time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.as_deref(), Some(TIMEOUT_NOTICE));
        assert!(expired.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_drop_stops_watchdog_without_notice() {
        let (client, _writer, expired, handle) =
            watchdog_pair(Duration::from_millis(200)).await;

        drop(handle);
        time::sleep(Duration::from_millis(500)).await;

        assert!(!expired.load(Ordering::Acquire));

        // No notice was written; the read just waits.
        let mut lines = BufReader::new(client).lines();
        let read = time::timeout(Duration::from_millis(300), lines.next_line()).await;
        assert!(read.is_err());
    }

    #[tokio::test]
    async fn test_touch_after_expiry_is_ignored() {
        let (_client, _writer, expired, handle) =
            watchdog_pair(Duration::from_millis(100)).await;

        time::sleep(Duration::from_millis(400)).await;
        assert!(expired.load(Ordering::Acquire));

        // The receiver is gone; this must not panic or block.
        handle.touch();
        handle.touch();
    }
}

//! Per-session audit log.
//!
//! Every session writes the messages it receives to its own file, named
//! after the remote endpoint. The core only emits records; where the
//! directory lives is configuration.

use chrono::{DateTime, Local, SecondsFormat};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Append-only message log for one session.
pub struct AuditLog {
    file: File,
}

impl AuditLog {
    /// Create the audit file for `peer` under `dir`, truncating any previous
    /// file for the same endpoint.
    pub async fn create(dir: &Path, peer: &SocketAddr) -> io::Result<Self> {
        let file = File::create(file_path(dir, peer)).await?;
        Ok(AuditLog { file })
    }

    /// Append one timestamped record.
    pub async fn append(&mut self, timestamp: DateTime<Local>, message: &str) -> io::Result<()> {
        let record = format!(
            "[{}] {}\n",
            timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            message
        );
        self.file.write_all(record.as_bytes()).await?;
        self.file.flush().await
    }
}

/// Audit file path for a peer. Colons are not filename-safe everywhere, and
/// IPv6 endpoints are full of them.
fn file_path(dir: &Path, peer: &SocketAddr) -> PathBuf {
    dir.join(format!("{}.log", peer.to_string().replace(':', "_")))
}

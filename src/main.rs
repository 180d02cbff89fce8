//! echoline: a line-oriented TCP echo server
//!
//! Accepts concurrent client sessions and answers newline-delimited messages
//! with a small command/greeting protocol:
//! - `hello` / `bye` greetings, everything else echoed back
//! - `/time`, `/echo`, `/quit` commands
//! - per-session inactivity timeout enforced by a watchdog task
//! - per-client audit log of received messages
//! - configuration via CLI arguments or TOML file

mod audit;
mod config;
mod protocol;
mod reader;
mod server;
mod session;
mod watchdog;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        timeout_secs = config.timeout_secs,
        audit_dir = %config.audit_dir.display(),
        "Starting echoline server"
    );

    // One session task plus one watchdog task per connection; the runtime
    // spreads them across the configured worker threads.
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(Server::new(config).run())
}

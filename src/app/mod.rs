pub mod config;

pub use config::{Config, ConfigError, LogLevel};

use crate::forwarder::Forwarder;
use crate::record::LogRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Stream name attached to records read from standard input.
const STDIN_STREAM: &str = "stdin";

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn setup_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Binary entry point: reads lines from stdin and appends each as a record.
/// Any other host (a logging-framework shim, a direct library call) can
/// drive [`Forwarder`] the same way.
pub async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(std::env::args())?;
    setup_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        application_name = %config.application_name,
        batch_size = config.batch_size,
        flush_interval_ms = config.flush_interval_ms,
        queue_capacity = config.queue_capacity,
        "starting relay-log-forwarder"
    );

    let forwarder = Arc::new(Forwarder::new(&config)?);
    forwarder.start();

    run_stdin_loop(&forwarder, &config).await;

    if let Err(e) = forwarder.stop(STOP_TIMEOUT).await {
        error!(error = %e, "shutdown did not complete cleanly");
    }
    let metrics = forwarder.metrics();
    info!(
        evicted = metrics.evicted,
        dropped = metrics.dropped,
        discarded = metrics.discarded,
        "relay-log-forwarder stopped"
    );
    Ok(())
}

/// Appends stdin lines until EOF or a termination signal.
async fn run_stdin_loop(forwarder: &Forwarder, config: &Config) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    #[cfg(unix)]
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    loop {
        #[cfg(unix)]
        let terminated = sigterm.recv();
        #[cfg(not(unix))]
        let terminated = std::future::pending::<Option<()>>();

        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        forwarder.append(LogRecord::new(
                            line,
                            config.application_name.clone(),
                            STDIN_STREAM,
                            config.log_type.clone(),
                        ));
                    }
                    Ok(None) => {
                        info!("input stream closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to read input");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = terminated => {
                info!("received SIGTERM, shutting down");
                break;
            }
        }
    }
}

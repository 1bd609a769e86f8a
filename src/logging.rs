//! Logging setup for the command line runner

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Log directory below the checkpoint directory
pub const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "ddpg-trader.log";

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. With `config.file` set,
/// logs also go to a daily-rolling file in `<checkpoint_dir>/logs`; the
/// returned guard must be held until exit so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig, checkpoint_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_dir = checkpoint_dir.join(LOG_DIR);
    let (file_layer, guard) = if config.file {
        // `rolling::daily` panics if it cannot create its first file
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {} ({}), file logging disabled",
                    log_dir.display(),
                    e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let (json_layer, console_layer) = if config.json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = installed {
        eprintln!("Warning: logging already initialized ({})", e);
    } else if file_logging_enabled {
        eprintln!("Logging to: {}/{}", log_dir.display(), LOG_FILE);
    }
    guard
}

/*!
 * Logging and tracing initialization
 */

use std::fs::OpenOptions;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::error::{NodeError, Result};

/// Default directives: the agent at `level`, tonic and hyper kept quiet.
fn default_directives(level: Level) -> String {
    format!("relaynode={},tonic=info,h2=warn", level)
}

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` takes precedence over the configured level. `verbose` forces
/// debug output for the agent.
pub fn init_logging(config: &LogConfig, verbose: bool) -> Result<()> {
    let log_level = if verbose {
        Level::DEBUG
    } else {
        config.level.to_tracing_level()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(log_level)))
        .map_err(|e| NodeError::Config(format!("Failed to create log filter: {}", e)))?;

    match config.file {
        Some(ref log_path) => init_file_logging(log_path, env_filter)?,
        None => init_stdout_logging(config.format, env_filter),
    }

    Ok(())
}

/// Stdout sink: compact lines for operators, or JSON for a log shipper
/// tailing the service journal.
fn init_stdout_logging(format: LogFormat, env_filter: EnvFilter) {
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_target(true).compact())
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .flatten_event(true)
                    .with_target(true)
                    .with_ansi(false),
            )
            .init(),
    }
}

/// Initialize logging to a file (appended, one JSON object per line)
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| NodeError::Config(format!("Failed to open log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Route agent logs at debug level into the test harness' captured output.
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(Level::DEBUG)));

        // Another test harness may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .compact()
            .try_init();
    });
}

use crate::error::CondenseError;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize logging system
///
/// Logs go to stderr (stdout carries the JSON result) and, when `log_dir`
/// is set, are mirrored to `condense.log` inside it.
///
/// # Arguments
/// * `log_dir` - Optional directory where the log file will be stored
/// * `log_level` - Filter directives, e.g. `info` or `condense_llm=debug,info`
pub fn setup_logging(log_dir: Option<&Path>, log_level: &str) -> Result<(), CondenseError> {
    let Some(log_dir) = log_dir else {
        return setup_console_logging(log_level);
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            CondenseError::config(format!(
                "Failed to create log directory {}: {}",
                log_dir.display(),
                e
            ))
        })?;
    }

    let log_file_path = log_dir.join("condense.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
        .map_err(|e| {
            CondenseError::config(format!(
                "Failed to open log file {}: {}",
                log_file_path.display(),
                e
            ))
        })?;

    let env_filter = env_filter(log_level)?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter.clone());

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false) // Remove ANSI color codes in files
        .with_span_events(FmtSpan::FULL)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized: level={}, log_file={}", log_level, log_file_path.display());

    Ok(())
}

/// Simple logging setup (stderr only)
pub fn setup_console_logging(log_level: &str) -> Result<(), CondenseError> {
    let env_filter = env_filter(log_level)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(env_filter)
        .init();

    tracing::debug!("Console logging initialized: level={}", log_level);

    Ok(())
}

/// Build the filter; RUST_LOG env var takes precedence
fn env_filter(log_level: &str) -> Result<EnvFilter, CondenseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => directive_filter(log_level),
    }
}

/// Parse filter directives, rejecting malformed ones
pub fn directive_filter(log_level: &str) -> Result<EnvFilter, CondenseError> {
    EnvFilter::try_new(log_level).map_err(|e| {
        CondenseError::config(format!("Invalid log level '{}': {}", log_level, e))
    })
}

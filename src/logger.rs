//! Tracing subscriber setup.
//!
//! Call [`init`] once from a binary entry point after config is resolved.

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Directive string, e.g. `"info"` or `"a2a_relay=debug,tower=warn"`.
    pub level: String,
    /// `true` when `level` came from an explicit override and must win over `RUST_LOG`.
    pub level_is_override: bool,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    pub fn stderr(level: impl Into<String>) -> Self {
        Self { level: level.into(), level_is_override: false, file: None }
    }
}

fn build_filter(settings: &LogSettings) -> Result<EnvFilter, AppError> {
    let level = settings.level.as_str();
    if settings.level_is_override {
        return EnvFilter::try_new(level).or_else(|level_err| {
            EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })
        });
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
}

/// Install the global subscriber.
pub fn init(settings: &LogSettings) -> Result<(), AppError> {
    let filter = build_filter(settings)?;

    let writer = match &settings.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("cannot open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Validate a plain level name before it is used.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

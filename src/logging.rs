//! Tracing subscriber setup for the `temper` binary.
//!
//! Logs go to stderr so stdout stays free for the refined artifact. An
//! optional file layer always writes JSON.

use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TEMPER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: text, json", s),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    pub format: LogFormat,
    /// Also append JSON logs to this file.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    pub fn default_directive(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// `TEMPER_LOG`, then `RUST_LOG`, then the verbosity default.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let (text_layer, json_layer) = match settings.format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            ),
        ),
    };

    let (file_layer, guard) = match settings.file {
        Some(ref path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(settings.filter())
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

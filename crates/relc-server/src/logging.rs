//! Structured logging for the compile service
//!
//! Pretty console output for development, JSON for production, and an
//! optional daily-rolling log file.

use crate::config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "relc-server.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    /// Unknown names fall back to `Stdout`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

/// Build the filter from the configured level, quieting HTTP internals.
fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level).or_else(|_| EnvFilter::try_new("info"))?;
    for directive in ["hyper=warn", "tokio=warn", "tower=warn", "h2=warn"] {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn file_appender(directory: &str) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(directory)?;
    Ok(RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);
    let filter = env_filter(&config.level)?;

    match (output, format) {
        (LogOutput::Stdout, LogFormat::Pretty) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_thread_ids(true).with_target(true))
            .try_init()?,
        (LogOutput::Stdout, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        (LogOutput::Stdout, LogFormat::Compact) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()?,
        (LogOutput::File, _) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(file_appender(&config.directory)?)
                    .with_ansi(false),
            )
            .try_init()?,
        (LogOutput::Both, format) => {
            let stdout_layer = match format {
                LogFormat::Pretty => fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_target(true)
                    .boxed(),
                LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
                LogFormat::Compact => fmt::layer().compact().boxed(),
            };
            let file_layer = fmt::layer()
                .with_writer(file_appender(&config.directory)?)
                .with_ansi(false)
                .boxed();
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()?
        }
    }

    tracing::info!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "logging initialized"
    );
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(directory = %config.directory, file = LOG_FILE, "writing log file");
    }
    Ok(())
}

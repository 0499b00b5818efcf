//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber from config
//! - Provide an injectable sink for components that report lifecycle events
//! - Parse level names leniently (`warning` == `warn`)
//!
//! # Design Decisions
//! - Components receive an `Arc<dyn LogSink>` at construction; there is no
//!   process-wide default logger to reach for
//! - `TracingSink` is the production sink and simply emits `tracing` events
//! - JSON format for production, pretty format for development
//! - Stdout and an optional append-only file, each with its own fmt layer
//! - `RUST_LOG` overrides the configured level until `LogHandle::set_level`

use std::fmt;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info` for anything unknown.
    pub fn parse(value: &str) -> Self {
        Self::parse_strict(value).unwrap_or(LogLevel::Info)
    }

    /// Parse a level name, returning `None` for anything unknown.
    pub fn parse_strict(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured field attached to a log record.
pub type Field<'a> = (&'a str, String);

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[Field<'_>]);
}

/// Sink that forwards records to the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Shared handle, ready to hand to a controller.
    pub fn shared() -> Arc<dyn LogSink> {
        Arc::new(TracingSink)
    }
}

/// Keys emitted as first-class `tracing` fields; anything else is rendered
/// into a single `extra` field.
const KNOWN_KEYS: [&str; 8] = ["service", "address", "error", "from", "to", "deadline", "partial", "signal"];

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, fields: &[Field<'_>]) {
        let get = |key: &str| fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());
        let service = get("service");
        let address = get("address");
        let error = get("error");
        let from = get("from");
        let to = get("to");
        let deadline = get("deadline");
        let partial = get("partial");
        let signal = get("signal");

        let rest: Vec<Field<'_>> = fields
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(k))
            .cloned()
            .collect();
        let extra = (!rest.is_empty()).then(|| render_fields(&rest));
        let extra = extra.as_deref();

        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    target: "service_core",
                    $level,
                    service,
                    address,
                    error,
                    from,
                    to,
                    deadline,
                    partial,
                    signal,
                    extra,
                    "{message}"
                )
            };
        }

        match level {
            LogLevel::Trace => emit!(tracing::Level::TRACE),
            LogLevel::Debug => emit!(tracing::Level::DEBUG),
            LogLevel::Info => emit!(tracing::Level::INFO),
            LogLevel::Warn => emit!(tracing::Level::WARN),
            LogLevel::Error => emit!(tracing::Level::ERROR),
        }
    }
}

fn render_fields(fields: &[Field<'_>]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A record captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Value of the named field, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that keeps records in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().expect("log sink mutex poisoned").clone()
    }

    /// Records whose message equals `message`.
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, fields: &[Field<'_>]) {
        let record = LogRecord {
            level,
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        self.records.lock().expect("log sink mutex poisoned").push(record);
    }
}

/// Error type for logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to change log level: {0}")]
    Reload(#[from] reload::Error),

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

type Base = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type OutputLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Changes the level of an installed subscriber at runtime.
#[derive(Debug, Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with `level`, including any `RUST_LOG` override.
    pub fn set_level(&self, level: LogLevel) -> Result<(), LoggingError> {
        self.filter.reload(EnvFilter::new(level.as_str()))?;
        tracing::info!(level = level.as_str(), "Log level changed");
        Ok(())
    }
}

/// Build the subscriber described by `config` without installing it.
pub fn build_logging(
    config: &LoggingConfig,
) -> Result<(impl tracing::Subscriber + Send + Sync + 'static, LogHandle), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(LogLevel::parse(&config.level).as_str())?,
    };
    let (filter, handle) = reload::Layer::new(filter);

    let mut outputs: Vec<OutputLayer> = Vec::new();
    if config.stdout {
        outputs.push(output_layer(config.format, std::io::stdout, true));
    }
    if let Some(path) = &config.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        outputs.push(output_layer(config.format, Mutex::new(file), false));
    }

    let subscriber = tracing_subscriber::registry().with(filter).with(outputs);
    Ok((subscriber, LogHandle { filter: handle }))
}

fn output_layer<W>(format: LogFormat, writer: W, ansi: bool) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Install the global `tracing` subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let (subscriber, handle) = build_logging(config)?;
    subscriber.try_init()?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse(" debug "), LogLevel::Debug);
        assert_eq!(LogLevel::parse("nonsense"), LogLevel::Info);
        assert_eq!(LogLevel::parse_strict("nonsense"), None);
        assert!(LogLevel::Error > LogLevel::Info);
    }

    #[test]
    fn memory_sink_captures_fields() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Info, "started", &[("service", "api".to_string())]);

        let records = sink.find("started");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].field("service"), Some("api"));
        assert_eq!(records[0].field("missing"), None);
    }

    #[test]
    fn fields_render_as_pairs() {
        let rendered = render_fields(&[("service", "api".into()), ("address", "127.0.0.1:1".into())]);
        assert_eq!(rendered, "service=api address=127.0.0.1:1");
    }

    fn json_file_config(path: &std::path::Path) -> LoggingConfig {
        LoggingConfig {
            format: LogFormat::Json,
            stdout: false,
            file: Some(path.to_path_buf()),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn file_output_follows_runtime_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.log");
        let (subscriber, handle) = build_logging(&json_file_config(&path)).unwrap();
        handle.set_level(LogLevel::Info).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info before reload");
            tracing::debug!("debug before reload");
            handle.set_level(LogLevel::Debug).unwrap();
            tracing::debug!("debug after reload");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("info before reload"));
        assert!(!content.contains("debug before reload"));
        assert!(content.contains("debug after reload"));
    }

    #[test]
    fn tracing_sink_emits_structured_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.log");
        let (subscriber, handle) = build_logging(&json_file_config(&path)).unwrap();
        handle.set_level(LogLevel::Info).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.log(
                LogLevel::Info,
                "Starting HTTP service",
                &[
                    ("service", "api".to_string()),
                    ("address", "127.0.0.1:3000".to_string()),
                    ("attempt", "2".to_string()),
                ],
            );
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content
            .lines()
            .find(|l| l.contains("Starting HTTP service"))
            .expect("event not written");
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        let fields = &event["fields"];
        assert_eq!(fields["service"], "api");
        assert_eq!(fields["address"], "127.0.0.1:3000");
        assert_eq!(fields["extra"], "attempt=2");
        assert!(fields.get("error").is_none());
    }
}

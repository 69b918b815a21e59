//! Tracing setup and the component logger facade
//!
//! File output goes through a daily-rolling non-blocking appender. Every
//! subsystem tags its lines with a component field so the flat log stays
//! greppable per subsystem.

use crate::config::LoggingConfig;
use crate::error::{FiacreError, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::{Level, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// The non-blocking writer flushes from a worker thread; dropping the guard
// loses buffered lines, so it lives as long as the process.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

/// Install the global tracing subscriber.
///
/// Safe to call more than once; the outcome of the first call is sticky.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT.get_or_init(|| try_init(config).map_err(|e| e.to_string()))
        .clone()
        .map_err(FiacreError::config)
}

fn try_init(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fiacre={},hyper=warn,reqwest=warn", level)));

    if file_logging_disabled() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer(std::io::stdout, config.json_format, level))
            .init();
        info!(%level, "logging initialized (console only)");
        return Ok(());
    }

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("fiacre")
        .filename_suffix("log")
        .max_log_files(config.backup_count as usize)
        .build(log_directory(&config.file))
        .map_err(|e| FiacreError::io(format!("cannot create log appender: {}", e)))?;
    let (writer, guard) = non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let console = config
        .console_output
        .then(|| fmt_layer(std::io::stdout, config.json_format, level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(writer, config.json_format, level))
        .with(console)
        .init();

    info!(%level, file = %config.file, "logging initialized");
    Ok(())
}

fn file_logging_disabled() -> bool {
    cfg!(test) || std::env::var_os("FIACRE_DISABLE_FILE_LOG").is_some()
}

fn fmt_layer<S, W>(writer: W, json: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json {
        base.json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        base.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

/// Directory the rolling appender writes into. A configured path with an
/// extension is taken as a file name inside that directory.
fn log_directory(file: &str) -> &Path {
    let path = Path::new(file);
    if path.extension().is_some() {
        path.parent().unwrap_or(path)
    } else {
        path
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        other => Err(FiacreError::config(format!("invalid log level: {}", other))),
    }
}

/// Component-tagged logger handed to each subsystem.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
    fields: Vec<(String, String)>,
}

impl StructuredLogger {
    /// Attach a fixed key-value pair to every message from this handle.
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn info(&self, message: &str) {
        info!(context = %self.render(), "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(context = %self.render(), "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(context = %self.render(), "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(context = %self.render(), "{}", message);
    }

    fn render(&self) -> String {
        let mut out = format!("component={}", self.component);
        for (key, value) in &self.fields {
            out.push_str(&format!(",{}={}", key, value));
        }
        out
    }
}

/// Logger for one named component.
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger {
        component: component.to_string(),
        fields: Vec::new(),
    }
}

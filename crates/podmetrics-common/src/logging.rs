//! Logging setup shared by podmetrics binaries
//!
//! Everything logs through `tracing`; [`init_logging`] installs one global
//! subscriber writing text or JSON lines to stdout, to a daily-rolling file, or
//! to both. The base level can be refined with extra directives such as
//! `sqlx=warn,aws_config=warn`.
//!
//! Prefer fields for values worth querying later:
//!
//! ```rust
//! use tracing::{error, info};
//!
//! let staging_table = "temp_episode_day_20240305";
//! let rows = 500;
//! info!(table = %staging_table, rows, "Copied page from staging table");
//! error!(vendor_id = "999999", "No ID found for EPISODE");
//! ```
//!
//! ```no_run
//! use podmetrics_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> podmetrics_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("Loader started");
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::{MetricsError, Result};

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

impl FromStr for LogOutput {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            other => Err(MetricsError::Parse(format!("Invalid log output: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(MetricsError::Parse(format!("Invalid log format: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Only used when `output` includes a file
    pub log_dir: PathBuf,
    /// Rolling file name prefix: "podmetrics-loader" -> "podmetrics-loader.2024-03-05"
    pub log_file_prefix: String,
    /// Comma separated directives added on top of `level`
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::default(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "podmetrics".to_string(),
            filter_directives: None,
        }
    }
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| MetricsError::Config(format!("{}={}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

impl LogConfig {
    /// Defaults overridden by `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`,
    /// `LOG_DIR`, `LOG_FILE_PREFIX` and `LOG_FILTER`.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Replace the fields the environment sets, keep the rest.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(level) = env_value("LOG_LEVEL")? {
            self.level = level;
        }
        if let Some(output) = env_value("LOG_OUTPUT")? {
            self.output = output;
        }
        if let Some(format) = env_value("LOG_FORMAT")? {
            self.format = format;
        }
        if let Some(dir) = env_value::<String>("LOG_DIR")? {
            self.log_dir = dir.into();
        }
        if let Some(prefix) = env_value("LOG_FILE_PREFIX")? {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = env_value("LOG_FILTER")? {
            self.filter_directives = Some(filter);
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = self.filter_directives.as_deref().unwrap_or_default();

        directives
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .try_fold(
                EnvFilter::from_default_env().add_directive(self.level.into()),
                |filter, raw| {
                    raw.parse()
                        .map(|directive| filter.add_directive(directive))
                        .map_err(|e| {
                            MetricsError::Config(format!("Invalid filter directive '{}': {}", raw, e))
                        })
                },
            )
    }
}

/// Flushes the non-blocking file writer when dropped; hold it until exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn layer_for<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(FmtSpan::CLOSE);

    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.output.console() {
        layers.push(layer_for(config.format, std::io::stdout, true));
    }

    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(layer_for(config.format, writer, false));
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| MetricsError::Config(format!("Failed to install subscriber: {}", e)))?;

    Ok(LogGuard { _file: file_guard })
}

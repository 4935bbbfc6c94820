use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for this crate (trace, debug, info, warn, error)
    pub level: Level,
    /// Emit JSON lines instead of human-readable output
    pub structured: bool,
    /// Also append to this file (never rotated)
    pub file_path: Option<PathBuf>,
    /// Whether to include file/line info in logs
    pub include_location: bool,
    /// Environment filter override (e.g., "chunkstore=debug,tokio=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            structured: false,
            file_path: None,
            include_location: false,
            env_filter: None,
        }
    }
}

static INIT: Once = Once::new();

/// Install the global tracing subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| result = setup_tracing(config));
    result
}

fn setup_tracing(config: LoggingConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    if config.structured {
        layers.push(console_layer.json().with_ansi(false).boxed());
    } else {
        layers.push(console_layer.with_ansi(true).boxed());
    }

    if let Some(file_path) = &config.file_path {
        let dir = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let file_name = file_path
            .file_name()
            .context("log file path has no file name")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let file_appender = tracing_appender::rolling::never(dir, file_name);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(UtcTime::rfc_3339())
            .with_target(true)
            .with_ansi(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location);
        if config.structured {
            layers.push(file_layer.json().boxed());
        } else {
            layers.push(file_layer.boxed());
        }
    }

    let env_filter = match &config.env_filter {
        Some(filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::from_default_env().add_directive(format!("chunkstore={}", config.level).parse()?),
    };

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = ?config.level,
        structured = config.structured,
        "Logging initialized"
    );

    Ok(())
}

/// Logs the elapsed time of a pipeline stage when dropped.
pub struct StageTimer {
    stage: &'static str,
    start: std::time::Instant,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        tracing::debug!(stage, "Stage started");
        Self {
            stage,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        tracing::debug!(
            stage = self.stage,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Stage completed"
        );
    }
}

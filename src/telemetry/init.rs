//! Subscriber installation.

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Shape of each log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Level and message only
    Compact,
    /// Adds target, file and line; used when debugging git invocations
    Detailed,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for events under the `fleximod` target; everything else stays at WARN
    pub level: Level,
    pub format: LogFormat,
    pub ansi: bool,
    /// Replaces the level-based filter entirely when set
    pub directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            ansi: true,
            directive: None,
        }
    }
}

impl TelemetryConfig {
    /// `-v` raises fleximod's events to INFO. `-vv` or `--debug` raises them
    /// to DEBUG, which logs every git command line, and switches to the
    /// detailed format.
    pub fn for_verbosity(verbose: u8, debug: bool) -> Self {
        let (level, format) = match (verbose, debug) {
            (0, false) => (Level::WARN, LogFormat::Compact),
            (1, false) => (Level::INFO, LogFormat::Compact),
            _ => (Level::DEBUG, LogFormat::Detailed),
        };
        Self {
            level,
            format,
            ..Self::default()
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directive) = &self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::from_default_env()
            .add_directive(Level::WARN.into())
            .add_directive(format!("fleximod={}", self.level).parse()?))
    }
}

/// Install the global subscriber writing to stderr. `RUST_LOG` directives
/// layer on top of the configured level.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    let detailed = config.format == LogFormat::Detailed;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(detailed)
        .with_file(detailed)
        .with_line_number(detailed);
    let layer = match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Detailed => layer.boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(layer)
        .try_init()?;
    Ok(())
}

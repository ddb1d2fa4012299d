use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for this crate (default: WARN)
    pub level: Level,
    /// Whether to colorize output (default: false)
    pub colorize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            colorize: false,
        }
    }
}

impl LoggingConfig {
    /// `-v` → info, `-vv` and up → debug.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        };
        Self {
            level,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        // RUST_LOG wins over the verbosity flag.
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| {
                let level = self.level.as_str().to_ascii_lowercase();
                EnvFilter::new(format!("llm_textcat_rs={level},run_pipeline={level}"))
            })
    }
}

/// Installs a stderr subscriber; stdout is left to the classification result.
/// Safe to call more than once: later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colorize)
        .with_target(false);
    let _ = tracing_subscriber::registry()
        .with(config.filter())
        .with(layer)
        .try_init();
}

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include source code locations
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            timestamps: true,
            source_location: false,
        }
    }
}

/// Initialize the logging system. Safe to call more than once; only the
/// first call installs the subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn setup_logging(config: &LogConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(config.source_location)
            .with_line_number(config.source_location);

        // try_init fails when another subscriber was installed first; keep it
        let _ = if config.timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let config = LogConfig::default();
        setup_logging(&config);
        setup_logging(&config);
        tracing::info!("logging initialized for tests");
    }
}

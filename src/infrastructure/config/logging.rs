//! Logging configuration and initialization.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `venuebridge=debug,warn`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Include the module path of each event.
    #[serde(default)]
    pub targets: bool,
}

fn default_level() -> String {
    "info".into()
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG`, when set, takes precedence
    /// over the configured level. A second call is a no-op.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = fmt()
            .with_env_filter(filter)
            .with_target(self.targets)
            .with_writer(std::io::stderr);

        let _ = match self.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Pretty => builder.try_init(),
        };
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            targets: false,
        }
    }
}

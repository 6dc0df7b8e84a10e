//! Logging configuration.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter when `DBFLOW_LOG` and `RUST_LOG` are unset.
pub const DEFAULT_FILTER: &str = "dbflow=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses `pretty` / `json` (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `dbflow=debug`.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Reads the configuration from the environment.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `DBFLOW_LOG` | Filter directives (falls back to `RUST_LOG`) |
    /// | `DBFLOW_LOG_FORMAT` | `pretty` or `json` |
    /// | `DBFLOW_LOG_FILE` | Log file path |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(filter) = non_empty_var("DBFLOW_LOG").or_else(|| non_empty_var("RUST_LOG")) {
            config.filter = filter;
        }
        if let Some(format) = non_empty_var("DBFLOW_LOG_FORMAT") {
            match LogFormat::parse(&format) {
                Some(parsed) => config.format = parsed,
                None => tracing::warn!(format = %format, "Unknown DBFLOW_LOG_FORMAT, using pretty"),
            }
        }
        config.file = non_empty_var("DBFLOW_LOG_FILE").map(PathBuf::from);
        config
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the `EnvFilter`, falling back to the default on bad directives.
    pub(crate) fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            tracing::warn!(filter = %self.filter, error = %e, "Invalid log filter, using default");
            EnvFilter::new(DEFAULT_FILTER)
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

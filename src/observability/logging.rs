//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

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
    /// Parses a format name. Unknown names select pretty output.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Optional append-mode log file; stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "warn".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// `NSRECALL_LOG_FORMAT`, `NSRECALL_LOG_FILTER`, and `NSRECALL_LOG_FILE`
    /// override the file. `verbose` raises the default filter to `debug`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();
        if verbose {
            config.filter = "debug".to_string();
        }

        if let Some(settings) = settings {
            if let Some(format) = settings.format.as_deref() {
                config.format = LogFormat::parse(format);
            }
            if let Some(filter) = settings.filter.as_ref().filter(|f| !f.trim().is_empty())
                && !verbose
            {
                config.filter.clone_from(filter);
            }
            config.file.clone_from(&settings.file);
        }

        if let Ok(v) = std::env::var("NSRECALL_LOG_FORMAT") {
            config.format = LogFormat::parse(&v);
        }
        if let Ok(v) = std::env::var("NSRECALL_LOG_FILTER")
            && !v.trim().is_empty()
        {
            config.filter = v;
        }
        if let Ok(v) = std::env::var("NSRECALL_LOG_FILE")
            && !v.trim().is_empty()
        {
            config.file = Some(PathBuf::from(v));
        }

        config
    }

    /// Returns the filter to install: `RUST_LOG` when set, else the configured directive.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("nsrecall=info".to_string()),
            file: Some(PathBuf::from("/tmp/nsrecall.log")),
        };
        let config = LoggingConfig::from_settings(Some(&settings), false);
        if std::env::var("NSRECALL_LOG_FORMAT").is_err() {
            assert_eq!(config.format, LogFormat::Json);
        }
        if std::env::var("NSRECALL_LOG_FILTER").is_err() {
            assert_eq!(config.filter, "nsrecall=info");
        }
    }

    #[test]
    fn test_verbose_wins_over_file_filter() {
        let settings = LoggingSettings {
            filter: Some("error".to_string()),
            ..LoggingSettings::default()
        };
        let config = LoggingConfig::from_settings(Some(&settings), true);
        if std::env::var("NSRECALL_LOG_FILTER").is_err() {
            assert_eq!(config.filter, "debug");
        }
    }
}

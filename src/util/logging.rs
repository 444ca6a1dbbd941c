//! Structured logging setup for slimbox
//!
//! Initializes a `tracing` subscriber writing to stderr, so that stdout stays
//! reserved for command output (plans, Dockerfiles, JSON). Supports plain or
//! JSON lines, `RUST_LOG` overrides and can only be initialized once.
//!
//! # Example
//!
//! ```no_run
//! use slimbox::util::logging;
//! use tracing::info;
//!
//! logging::init_from_env();
//! info!(project = "hackathon-api", "Planning image");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

/// Dependencies that are chatty at debug level
const NOISY_TARGETS: &[&str] = &["bollard", "hyper", "hyper_util", "h2"];

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to display
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    /// Include the module target (e.g., slimbox::stages) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name in logs
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON lines with full metadata, for CI log collectors
    pub fn ci() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }
}

/// Parses a log level, falling back to INFO
///
/// ```
/// use slimbox::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Filter for `level`, with noisy dependencies capped at WARN unless
/// `RUST_LOG` is set
pub fn build_filter(level: Level) -> EnvFilter {
    let rust_log = env::var("RUST_LOG").ok();
    let mut filter = match rust_log {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(level.to_string()),
    };

    if let Ok(directive) = format!("slimbox={}", level).parse() {
        filter = filter.add_directive(directive);
    }
    if rust_log.is_none() {
        for target in NOISY_TARGETS {
            if let Ok(directive) = format!("{}=warn", target).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Initializes the logging system; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `SLIMBOX_LOG_LEVEL` and `SLIMBOX_LOG_JSON`
pub fn init_from_env() {
    init_logging(config_from_env(|key| env::var(key).ok()));
}

/// Reads `SLIMBOX_LOG_LEVEL` and `SLIMBOX_LOG_JSON` through `lookup`.
///
/// JSON output carries the full [`LoggingConfig::ci`] metadata.
pub fn config_from_env(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let level = lookup("SLIMBOX_LOG_LEVEL")
        .map(|l| parse_level(&l))
        .unwrap_or(Level::INFO);
    let use_json = lookup("SLIMBOX_LOG_JSON")
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    if use_json {
        LoggingConfig {
            level,
            ..LoggingConfig::ci()
        }
    } else {
        LoggingConfig::with_level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level(" Debug "), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.include_target);
        assert!(!config.include_location);
    }

    #[test]
    fn test_ci_config() {
        let config = LoggingConfig::ci();
        assert!(config.use_json);
        assert!(config.include_location);
        assert!(config.include_thread_ids);
    }

    #[test]
    fn test_config_from_env() {
        let vars = HashMap::from([
            ("SLIMBOX_LOG_LEVEL", "debug"),
            ("SLIMBOX_LOG_JSON", "true"),
        ]);
        let config = config_from_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.use_json);
        assert!(config.include_location);
        assert!(config.include_thread_ids);

        let config = config_from_env(|_| None);
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
    }
}

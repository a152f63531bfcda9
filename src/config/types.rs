//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::config::constants::{
    DEFAULT_COMMIT_TIMEOUT, DEFAULT_GEO_API_URL, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_MAX_HOPS,
    DEFAULT_USER_AGENT,
};
use crate::error_handling::ConfigError;
use crate::session::{SessionConfig, TraceSettings};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Engine configuration (no CLI dependencies).
///
/// Controls how hops are enriched and how long out-of-order hops may stay
/// buffered. Session-specific trace settings are passed per session to
/// [`SessionStore::create`](crate::SessionStore::create) instead.
///
/// # Examples
///
/// ```no_run
/// use trace_sessions::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     lookup_timeout: Duration::from_secs(2),
///     commit_timeout: Duration::from_secs(4),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Geolocation endpoint (queried with `?q={ip}&output=json`)
    pub geo_api_url: String,

    /// Upper bound for a single geolocation lookup
    pub lookup_timeout: Duration,

    /// Maximum time a hop waits in the reorder buffer for earlier tickets
    pub commit_timeout: Duration,

    /// HTTP User-Agent header value
    pub user_agent: String,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geo_api_url: DEFAULT_GEO_API_URL.to_string(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

impl Config {
    /// Checks the configuration before any resource is built from it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the geolocation URL is not an absolute
    /// http(s) URL, when either timeout is zero, or when `commit_timeout` is
    /// not longer than `lookup_timeout`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.geo_api_url)
            .map_err(|e| ConfigError::InvalidGeoApiUrl(self.geo_api_url.clone(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidGeoApiUrl(
                self.geo_api_url.clone(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.lookup_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("lookup_timeout"));
        }
        if self.commit_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("commit_timeout"));
        }
        // Every earlier hop finishes enrichment within lookup_timeout, so a
        // longer commit wait never skips a ticket that is still in time.
        if self.commit_timeout <= self.lookup_timeout {
            return Err(ConfigError::CommitTimeoutTooShort {
                commit_ms: self.commit_timeout.as_millis(),
                lookup_ms: self.lookup_timeout.as_millis(),
            });
        }
        Ok(())
    }
}

/// Command-line options.
///
/// # Examples
///
/// ```bash
/// # Replay a recorded trace
/// trace_sessions hops.jsonl --dest-ip 8.8.8.8
///
/// # Read hop events from a running tracer
/// tracer 1.1.1.1 | trace_sessions - --dest-ip 1.1.1.1 --name cloudflare
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "trace_sessions",
    about = "Builds a traceroute session from hop events and enriches every hop with geolocation."
)]
pub struct Opt {
    /// Hop event file (newline-delimited JSON), or '-' for stdin
    #[arg(value_parser)]
    pub file: PathBuf,

    /// Destination IP the trace was run toward
    #[arg(long)]
    pub dest_ip: String,

    /// Display name of the session (defaults to the destination)
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum hop count
    #[arg(long, default_value_t = DEFAULT_MAX_HOPS)]
    pub max_hops: u32,

    /// Delay between sent packets in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub send_rate_ms: u64,

    /// Per-packet receive timeout in milliseconds
    #[arg(long, default_value_t = 15_000)]
    pub receive_timeout_ms: u64,

    /// Overall trace timeout in milliseconds
    #[arg(long, default_value_t = 60_000)]
    pub trace_timeout_ms: u64,

    /// Geolocation endpoint
    #[arg(long, default_value = DEFAULT_GEO_API_URL)]
    pub geo_api_url: String,

    /// Per-lookup timeout in seconds
    #[arg(long, default_value_t = DEFAULT_LOOKUP_TIMEOUT.as_secs())]
    pub lookup_timeout_seconds: u64,

    /// Reorder buffer timeout in seconds
    #[arg(long, default_value_t = DEFAULT_COMMIT_TIMEOUT.as_secs())]
    pub commit_timeout_seconds: u64,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Opt {
    /// Splits the options into engine configuration and the session to create.
    pub fn into_parts(self) -> (Config, SessionConfig, PathBuf) {
        let config = Config {
            geo_api_url: self.geo_api_url,
            lookup_timeout: Duration::from_secs(self.lookup_timeout_seconds),
            commit_timeout: Duration::from_secs(self.commit_timeout_seconds),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: self.log_level,
            log_format: self.log_format,
        };
        let session = SessionConfig {
            name: self.name.unwrap_or_else(|| self.dest_ip.clone()),
            dest_ip: self.dest_ip,
            settings: TraceSettings {
                max_hops: self.max_hops,
                send_rate: Duration::from_millis(self.send_rate_ms),
                receive_timeout: Duration::from_millis(self.receive_timeout_ms),
                trace_timeout: Duration::from_millis(self.trace_timeout_ms),
            },
        };
        (config, session, self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.commit_timeout > config.lookup_timeout);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = Config {
            lookup_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("lookup_timeout"))
        ));

        let config = Config {
            commit_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("commit_timeout"))
        ));
    }

    #[test]
    fn test_validate_requires_commit_longer_than_lookup() {
        for commit in [Duration::from_secs(2), Duration::from_secs(1)] {
            let config = Config {
                lookup_timeout: Duration::from_secs(2),
                commit_timeout: commit,
                ..Default::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::CommitTimeoutTooShort { lookup_ms: 2000, .. })
                ),
                "commit_timeout {:?} should be rejected",
                commit
            );
        }

        let config = Config {
            lookup_timeout: Duration::from_secs(2),
            commit_timeout: Duration::from_millis(2001),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        for url in ["not a url", "ftp://example.com/geoip", ""] {
            let config = Config {
                geo_api_url: url.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidGeoApiUrl(..))),
                "URL {:?} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_opt_into_parts() {
        let opt = Opt::parse_from([
            "trace_sessions",
            "hops.jsonl",
            "--dest-ip",
            "8.8.8.8",
            "--max-hops",
            "20",
            "--send-rate-ms",
            "500",
        ]);
        let (config, session, file) = opt.into_parts();

        assert_eq!(file, PathBuf::from("hops.jsonl"));
        assert_eq!(config.geo_api_url, DEFAULT_GEO_API_URL);
        assert_eq!(session.name, "8.8.8.8");
        assert_eq!(session.dest_ip, "8.8.8.8");
        assert_eq!(session.settings.max_hops, 20);
        assert_eq!(session.settings.send_rate, Duration::from_millis(500));
        assert_eq!(session.settings.receive_timeout, Duration::from_secs(15));
        assert_eq!(session.settings.trace_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_opt_explicit_name() {
        let opt = Opt::parse_from([
            "trace_sessions",
            "-",
            "--dest-ip",
            "1.1.1.1",
            "--name",
            "cloudflare",
        ]);
        let (_, session, file) = opt.into_parts();
        assert_eq!(file, PathBuf::from("-"));
        assert_eq!(session.name, "cloudflare");
    }
}

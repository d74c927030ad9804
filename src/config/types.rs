//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::config::constants::{
    DB_PATH, DEFAULT_CACHE_TTL_SECS, DEFAULT_DB_TIMEOUT_MS, DEFAULT_HTTP_PORT,
    DEFAULT_RATE_LIMIT, DEFAULT_RATE_LIMIT_TTL_SECS, DEFAULT_SNAPSHOT_URL,
};
use crate::error_handling::ConfigError;

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
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options.
///
/// Every option can also be set through its `IP_INFO_*` environment variable,
/// which makes the binary usable from a `.env` file or a container manifest.
///
/// ```bash
/// ip_info --db-path ./ip_info.db --http-port 8080 --enable-limiter --rate-limit 20
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "ip_info",
    version,
    about = "ip_info is a microservice for IP location determination"
)]
pub struct Opt {
    /// Database path (SQLite file)
    #[arg(long, env = "IP_INFO_DATABASE_PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    /// HTTP server port
    #[arg(long, env = "IP_INFO_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, env = "IP_INFO_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, env = "IP_INFO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Deadline for each database call, in milliseconds
    #[arg(long, env = "IP_INFO_DATABASE_TIMEOUT", default_value_t = DEFAULT_DB_TIMEOUT_MS)]
    pub db_timeout_ms: u64,

    /// Snapshot URL template; `{year}` and `{month}` are substituted in UTC
    #[arg(long, env = "IP_INFO_SNAPSHOT_URL", default_value = DEFAULT_SNAPSHOT_URL)]
    pub snapshot_url: String,

    /// Enable the per-client rate limiter
    #[arg(long, env = "IP_INFO_ENABLE_LIMITER")]
    pub enable_limiter: bool,

    /// Requests per second allowed per client
    #[arg(long, env = "IP_INFO_RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: u32,

    /// Seconds an idle client's limiter state is kept
    #[arg(long, env = "IP_INFO_RATE_LIMIT_TTL", default_value_t = DEFAULT_RATE_LIMIT_TTL_SECS)]
    pub rate_limit_ttl_secs: u64,

    /// Disable the in-memory location cache
    #[arg(long, env = "IP_INFO_DISABLE_CACHE")]
    pub disable_cache: bool,

    /// Seconds a cached location stays valid
    #[arg(long, env = "IP_INFO_CACHE_TTL", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,
}

/// Library configuration (no CLI dependencies).
///
/// ```no_run
/// use ip_info::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     db_path: PathBuf::from("./ip_info.db"),
///     enable_limiter: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Database path (SQLite file)
    pub db_path: PathBuf,

    /// HTTP server port
    pub http_port: u16,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,

    /// Per-call database deadline in milliseconds
    pub db_timeout_ms: u64,

    /// Snapshot URL template
    pub snapshot_url: String,

    /// Enable the per-client rate limiter
    pub enable_limiter: bool,

    /// Requests per second allowed per client
    pub rate_limit: u32,

    /// Seconds an idle client's limiter state is kept
    pub rate_limit_ttl_secs: u64,

    /// Disable the location cache
    pub disable_cache: bool,

    /// Seconds a cached location stays valid
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_PATH),
            http_port: DEFAULT_HTTP_PORT,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            db_timeout_ms: DEFAULT_DB_TIMEOUT_MS,
            snapshot_url: DEFAULT_SNAPSHOT_URL.to_string(),
            enable_limiter: false,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_limit_ttl_secs: DEFAULT_RATE_LIMIT_TTL_SECS,
            disable_cache: false,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl From<Opt> for Config {
    fn from(opt: Opt) -> Self {
        Self {
            db_path: opt.db_path,
            http_port: opt.http_port,
            log_level: opt.log_level,
            log_format: opt.log_format,
            db_timeout_ms: opt.db_timeout_ms,
            snapshot_url: opt.snapshot_url,
            enable_limiter: opt.enable_limiter,
            rate_limit: opt.rate_limit,
            rate_limit_ttl_secs: opt.rate_limit_ttl_secs,
            disable_cache: opt.disable_cache,
            cache_ttl_secs: opt.cache_ttl_secs,
        }
    }
}

impl Config {
    /// Checks the values clap cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_timeout_ms == 0 {
            return Err(ConfigError::Invalid("database timeout must be positive"));
        }
        if !self.snapshot_url.contains("{year}") || !self.snapshot_url.contains("{month}") {
            return Err(ConfigError::SnapshotTemplate(self.snapshot_url.clone()));
        }
        let sample = self
            .snapshot_url
            .replace("{year}", "2000")
            .replace("{month}", "01");
        match Url::parse(&sample) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::SnapshotUrl(self.snapshot_url.clone())),
        }
        if self.enable_limiter {
            if self.rate_limit == 0 {
                return Err(ConfigError::Invalid("rate limit must be positive"));
            }
            if self.rate_limit_ttl_secs == 0 {
                return Err(ConfigError::Invalid("rate limiter ttl must be positive"));
            }
        }
        if !self.disable_cache && self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache ttl must be positive"));
        }
        Ok(())
    }

    /// Per-call database deadline.
    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    /// Lifetime of a cached location.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// How long an idle client's limiter state is kept.
    pub fn rate_limit_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_limit_ttl_secs)
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
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.db_timeout_ms, 5000);
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert!(!config.enable_limiter);
        assert!(!config.disable_cache);
        assert_eq!(config.db_path, PathBuf::from("./ip_info.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_opt_parses_flags() {
        let opt = Opt::try_parse_from([
            "ip_info",
            "--db-path",
            "/tmp/geo.db",
            "--http-port",
            "9090",
            "--enable-limiter",
            "--rate-limit",
            "25",
            "--log-format",
            "json",
        ])
        .expect("flags should parse");
        let config = Config::from(opt);
        assert_eq!(config.db_path, PathBuf::from("/tmp/geo.db"));
        assert_eq!(config.http_port, 9090);
        assert!(config.enable_limiter);
        assert_eq!(config.rate_limit, 25);
        assert!(matches!(config.log_format, LogFormat::Json));
    }

    #[test]
    fn test_opt_rejects_out_of_range_port() {
        let result = Opt::try_parse_from(["ip_info", "--http-port", "70000"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholders() {
        let config = Config {
            snapshot_url: "https://example.com/dbip.csv.gz".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SnapshotTemplate(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_template() {
        for template in ["ftp://example.com/{year}-{month}.csv.gz", "{year}-{month}.csv.gz"] {
            let config = Config {
                snapshot_url: template.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::SnapshotUrl(_))),
                "{template}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit_only_when_enabled() {
        let disabled = Config {
            rate_limit: 0,
            ..Default::default()
        };
        assert!(disabled.validate().is_ok());

        let enabled = Config {
            rate_limit: 0,
            enable_limiter: true,
            ..Default::default()
        };
        assert!(enabled.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cache_ttl() {
        let config = Config {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let without_cache = Config {
            cache_ttl_secs: 0,
            disable_cache: true,
            ..Default::default()
        };
        assert!(without_cache.validate().is_ok());
    }
}

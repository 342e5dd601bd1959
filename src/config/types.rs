use crate::ConfigError;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for statehouse
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub http: HttpConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "session")]
    pub sessions: Vec<SessionEntry>,
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Minimum time between requests to the same domain (milliseconds)
    pub min_delay_ms: u64,

    /// Timeout of a single queue poll (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time workers get to exit after shutdown is signalled (seconds)
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Period of checkpoint writes while the crawl runs (seconds)
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// Pause before a page waiting on an unsettled reference is retried (milliseconds)
    #[serde(default = "default_lookup_backoff_ms")]
    pub lookup_backoff_ms: u64,

    /// Number of times a page may wait on unsettled references
    #[serde(default = "default_max_lookup_attempts")]
    pub max_lookup_attempts: u32,

    /// Fail pages on selector misses and malformed fields
    #[serde(default)]
    pub strict: bool,

    /// IANA zone the site's dates are local to
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl CrawlerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn lookup_backoff(&self) -> Duration {
        Duration::from_millis(self.lookup_backoff_ms)
    }

    /// Parses the configured time zone
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::Validation(format!("Unknown timezone '{}': {}", self.timezone, e))
        })
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_join_timeout_secs() -> u64 {
    30
}

fn default_checkpoint_interval_secs() -> u64 {
    60
}

fn default_lookup_backoff_ms() -> u64 {
    50
}

fn default_max_lookup_attempts() -> u32 {
    200
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,

    /// Attempts per page before the fetch fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the linear backoff between attempts (milliseconds)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Requests served by one domain session before it is rebuilt
    #[serde(default = "default_recycle_after")]
    pub recycle_after: u32,

    /// Whole-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    /// Formats the user agent: `Name/Version (+ContactURL; ContactEmail)`
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_recycle_after() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Path to the graph checkpoint
    pub checkpoint_path: PathBuf,

    /// Path to the cache of fully processed URLs
    pub known_links_path: PathBuf,
}

/// A crawl session (e.g. one General Assembly) and its seed URLs
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    /// Session label copied onto every page crawled from these seeds
    pub name: String,

    /// Seed URLs, crawled one at a time as roots
    pub seeds: Vec<String>,
}

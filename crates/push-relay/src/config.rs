//! Configuration for push-relay.
//!
//! Loaded once at startup from a TOML file:
//!
//! ```toml
//! [logger]
//! log_prefix = "[push] "
//! log_level = "info"
//!
//! [database]
//! redis_addr = "127.0.0.1:6379"
//! redis_password = ""
//!
//! [http_client]
//! max_idle_conns = 100
//! max_idle_conns_per_host = 10
//!
//! [[channels]]
//! name = "orders"
//! concurrency = 8
//! api_endpoint = "http://127.0.0.1:8080/push"
//! ```
//!
//! Validation runs inside [`RelayConfig::from_toml_str`], so a config that
//! loads is one the relay can start from.

use crate::consumer::TopicBinding;
use crate::error::{RelayError, RelayResult};
use observability::LogLevel;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default log line prefix.
pub const DEFAULT_LOG_PREFIX: &str = "[push] ";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub logger: LoggerConfig,
    pub database: DatabaseConfig,
    pub http_client: HttpClientConfig,
    pub channels: Vec<ChannelConfig>,
}

/// `[logger]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    /// Prepended to every log line.
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// debug, info, warn, error or fatal.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional JSONL file sink.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_log_prefix() -> String {
    DEFAULT_LOG_PREFIX.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_prefix: default_log_prefix(),
            log_level: default_log_level(),
            log_path: None,
        }
    }
}

impl LoggerConfig {
    /// Parse `log_level`.
    pub fn level(&self) -> RelayResult<LogLevel> {
        self.log_level
            .parse()
            .map_err(|e| RelayError::Config(format!("logger.log_level: {e}")))
    }
}

/// `[database]` section: the Redis bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    pub redis_addr: String,
    /// Empty means no AUTH.
    #[serde(default)]
    pub redis_password: String,
    #[serde(default)]
    pub redis_db: i64,
}

impl DatabaseConfig {
    /// Connection URL with password and database applied.
    pub fn redis_url(&self) -> RelayResult<Url> {
        let raw = if self.redis_addr.contains("://") {
            self.redis_addr.clone()
        } else {
            format!("redis://{}", self.redis_addr)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| RelayError::Config(format!("database.redis_addr '{}': {e}", self.redis_addr)))?;

        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(RelayError::Config(format!(
                "database.redis_addr '{}': unsupported scheme '{}'",
                self.redis_addr,
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(RelayError::Config(format!(
                "database.redis_addr '{}': missing host",
                self.redis_addr
            )));
        }

        if !self.redis_password.is_empty() {
            url.set_password(Some(&self.redis_password)).map_err(|()| {
                RelayError::Config("database.redis_password cannot be applied to redis_addr".to_string())
            })?;
        }
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(&format!("/{}", self.redis_db));
        }

        Ok(url)
    }
}

/// `[http_client]` section: outbound pool and timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: i64,
    #[serde(default = "default_max_idle_conns_per_host")]
    pub max_idle_conns_per_host: i64,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_idle_conn_timeout_secs")]
    pub idle_conn_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_idle_conns() -> i64 {
    100
}

fn default_max_idle_conns_per_host() -> i64 {
    10
}

fn default_dial_timeout_secs() -> u64 {
    30
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_idle_conn_timeout_secs() -> u64 {
    90
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_idle_conns: default_max_idle_conns(),
            max_idle_conns_per_host: default_max_idle_conns_per_host(),
            dial_timeout_secs: default_dial_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
            idle_conn_timeout_secs: default_idle_conn_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn idle_conn_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_conn_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Idle connections kept per host: the per-host limit, capped by the
    /// overall limit when that one is set.
    pub fn pool_max_idle_per_host(&self) -> usize {
        let per_host = self.max_idle_conns_per_host.max(0) as usize;
        if self.max_idle_conns > 0 {
            per_host.min(self.max_idle_conns as usize)
        } else {
            per_host
        }
    }

    fn validate(&self) -> RelayResult<()> {
        if self.max_idle_conns < 0 || self.max_idle_conns_per_host < 0 {
            return Err(RelayError::Config(
                "http_client idle connection limits must not be negative".to_string(),
            ));
        }
        if self.dial_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(RelayError::Config(
                "http_client dial and request timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One `[[channels]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    pub concurrency: i64,
    pub api_endpoint: String,
}

impl ChannelConfig {
    fn binding(&self) -> RelayResult<TopicBinding> {
        let endpoint = Url::parse(&self.api_endpoint).map_err(|e| {
            RelayError::Config(format!(
                "channel '{}': invalid api_endpoint '{}': {e}",
                self.name, self.api_endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "channel '{}': api_endpoint must be http or https, got '{}'",
                self.name,
                endpoint.scheme()
            )));
        }
        TopicBinding::new(self.name.clone(), self.concurrency, endpoint)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    logger: LoggerConfig,
    database: Option<DatabaseConfig>,
    #[serde(default)]
    http_client: HttpClientConfig,
    channels: Option<Vec<ChannelConfig>>,
}

impl RelayConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> RelayResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Loading config file {} failed: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> RelayResult<Self> {
        let raw: RawConfig = toml::from_str(content)?;

        let database = raw
            .database
            .ok_or_else(|| RelayError::Config("[database] section missing".to_string()))?;
        let channels = raw
            .channels
            .ok_or_else(|| RelayError::Config("[[channels]] missing".to_string()))?;

        let config = Self {
            logger: raw.logger,
            database,
            http_client: raw.http_client,
            channels,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> RelayResult<()> {
        self.logger.level()?;
        self.database.redis_url()?;
        self.http_client.validate()?;

        if self.channels.is_empty() {
            return Err(RelayError::Config("[[channels]] is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(RelayError::Config("channel name must not be empty".to_string()));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(RelayError::Config(format!(
                    "channel '{}' is configured more than once",
                    channel.name
                )));
            }
            channel.binding()?;
        }

        Ok(())
    }

    /// One binding per `[[channels]]` entry, in file order.
    pub fn bindings(&self) -> RelayResult<Vec<TopicBinding>> {
        self.channels.iter().map(ChannelConfig::binding).collect()
    }

    /// Logging capability settings derived from `[logger]`.
    pub fn log_config(&self, service_name: &str) -> RelayResult<observability::LogConfig> {
        Ok(observability::LogConfig {
            service_name: service_name.to_string(),
            prefix: self.logger.log_prefix.clone(),
            level: self.logger.level()?,
            log_path: self.logger.log_path.clone(),
            also_stderr: true,
        })
    }
}

//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. When absent, notifications are queued in-process.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Notification delivery configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

impl ServerConfig {
    /// Public profile URL for a username (`{url}/api/users/{username}`).
    #[must_use]
    pub fn profile_url(&self, username: &str) -> String {
        let path = format!("api/users/{username}");
        let base = if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        };

        match Url::parse(&base).and_then(|u| u.join(&path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{base}{path}"),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys and channels.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Notification delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Capacity of the in-process notification queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum delivery attempts per channel before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Persist notifications into the user's inbox.
    #[serde(default = "default_true")]
    pub database: bool,
    /// Push notifications over the real-time channel.
    #[serde(default = "default_true")]
    pub broadcast: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            database: true,
            broadcast: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    50
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "parley".to_string()
}

const fn default_queue_capacity() -> usize {
    1000
}

const fn default_workers() -> usize {
    4
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    500
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `PARLEY_ENV`)
    /// 3. Environment variables with `PARLEY_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("PARLEY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Identity configuration.
    pub auth: AuthConfig,
    /// Poll behaviour.
    #[serde(default)]
    pub polls: PollsConfig,
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

/// Identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: String,
    /// Whether callers without a bearer token may vote with a device token.
    #[serde(default)]
    pub allow_guest_votes: bool,
}

/// Poll configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollsConfig {
    /// Voting window applied when a poll is created without an end date.
    #[serde(default = "default_duration_days")]
    pub default_duration_days: i64,
    /// Maximum number of options per poll.
    #[serde(default = "default_max_options")]
    pub max_options: usize,
    /// How often expired polls are swept closed.
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_secs: u64,
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            default_duration_days: default_duration_days(),
            max_options: default_max_options(),
            expiry_sweep_interval_secs: default_sweep_interval(),
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
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_duration_days() -> i64 {
    7
}

const fn default_max_options() -> usize {
    10
}

const fn default_sweep_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `NEIGHBORLY_ENV`)
    /// 3. Environment variables with `NEIGHBORLY__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("NEIGHBORLY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("NEIGHBORLY")
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
                config::Environment::with_prefix("NEIGHBORLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

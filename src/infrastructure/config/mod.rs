use crate::domain::error::{AppError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_CONFIG_PATH: &str = "ZENIT_CONFIG";
pub const ENV_PREFIX: &str = "ZENIT_";

const DEFAULT_CONFIG_FILE: &str = "zenit.toml";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DATABASE_PATH: &str = "data/zenit_tracker.db";
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_DATABASE_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_COOKIE_NAME: &str = "zenit-auth-session";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 14;
/// Upper bound for `auth.session_ttl_hours` (one leap year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;
const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
const DEFAULT_KEYRING_SERVICE: &str = "ZenitTracker";
const DEFAULT_KEYRING_ENTRY: &str = "service-secret";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_ttl_hours: i64,
    #[serde(default)]
    pub secure_cookie: bool,
    pub keyring_service: String,
    pub keyring_entry: String,
    /// Explicit service secret; consulted when the keyring has none.
    #[serde(default)]
    pub service_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_DATABASE_BUSY_TIMEOUT_MS,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            secure_cookie: false,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            keyring_entry: DEFAULT_KEYRING_ENTRY.to_string(),
            service_secret: None,
        }
    }
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl AuthConfig {
    /// Saturates instead of wrapping; `validate` keeps loaded values in range.
    pub fn session_ttl_millis(&self) -> i64 {
        self.session_ttl_hours.saturating_mul(MILLIS_PER_HOUR)
    }
}

impl AppConfig {
    /// Defaults, then `zenit.toml` (or the file named by `ZENIT_CONFIG`), then `ZENIT_*` env vars.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::Configuration(format!("Failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration(
                "server.port must be greater than zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::Configuration(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(AppError::Configuration(
                "auth.session_ttl_hours must be greater than zero".to_string(),
            ));
        }
        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(AppError::Configuration(format!(
                "auth.session_ttl_hours must be at most {} (got {})",
                MAX_SESSION_TTL_HOURS, self.auth.session_ttl_hours
            )));
        }
        let cookie_name = self.auth.cookie_name.trim();
        if cookie_name.is_empty()
            || !cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Configuration(format!(
                "auth.cookie_name is not a valid cookie name: {:?}",
                self.auth.cookie_name
            )));
        }
        Ok(())
    }
}

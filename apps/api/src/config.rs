//! # API Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     NEXUS_PORT=8080                                                    │
//! │     NEXUS_JWT_SECRET=...                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, else $NEXUS_CONFIG, else                          │
//! │     ~/.config/nexus-crm/api.toml (Linux)                               │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//! environment = "production"
//! cors_origins = ["https://crm.example.com"]
//!
//! [database]
//! path = "/var/lib/nexus/nexus.db"
//! max_connections = 8
//!
//! [auth]
//! jwt_secret = "change-me-to-at-least-32-characters"
//! access_token_lifetime_secs = 43200
//!
//! [sales]
//! tax_rate_bps = 1800
//!
//! [inventory]
//! reservation_ttl_secs = 300
//! sweep_interval_secs = 60
//!
//! [notifications.whatsapp]
//! enabled = false
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use nexus_core::{TaxRate, DEFAULT_TAX_RATE_BPS};
use nexus_notify::NotificationsConfig;

/// Secret used when none is configured. Rejected outside development.
const DEV_JWT_SECRET: &str = "nexus-dev-secret-change-in-production";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[inline]
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue("NEXUS_ENVIRONMENT".into())),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Error responses carry a `detail` field only in development.
    pub environment: Environment,
    /// Allowed browser origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Development,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Configured path, else `<data dir>/nexus.db`, else `./nexus.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "nexus", "nexus-crm")
                .map(|dirs| dirs.data_dir().join("nexus.db"))
                .unwrap_or_else(|| PathBuf::from("nexus.db"))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_lifetime_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_lifetime_secs: 12 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesConfig {
    /// Flat tax rate in basis points (1800 = 18%).
    pub tax_rate_bps: u32,
}

impl Default for SalesConfig {
    fn default() -> Self {
        SalesConfig {
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
        }
    }
}

impl SalesConfig {
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Holds older than this are released by the sweeper.
    pub reservation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            reservation_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

// =============================================================================
// ApiConfig
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub sales: SalesConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl ApiConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var_os("NEXUS_CONFIG").map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Applies `NEXUS_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, value: String) -> ConfigResult<T> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        }

        if let Some(v) = lookup("NEXUS_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("NEXUS_PORT") {
            self.server.port = parse("NEXUS_PORT", v)?;
        }
        if let Some(v) = lookup("NEXUS_ENVIRONMENT") {
            self.server.environment = v.parse()?;
        }
        if let Some(v) = lookup("NEXUS_CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("NEXUS_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NEXUS_JWT_SECRET") {
            debug!("Overriding JWT secret from environment");
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("NEXUS_TAX_RATE_BPS") {
            self.sales.tax_rate_bps = parse("NEXUS_TAX_RATE_BPS", v)?;
        }
        if let Some(v) = lookup("NEXUS_RESERVATION_TTL_SECS") {
            self.inventory.reservation_ttl_secs = parse("NEXUS_RESERVATION_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("NEXUS_WHATSAPP_AUTH_TOKEN") {
            self.notifications.whatsapp.auth_token = v;
        }
        if let Some(v) = lookup("NEXUS_SMTP_PASSWORD") {
            self.notifications.email.password = v;
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.auth.access_token_lifetime_secs <= 0 {
            return Err(ConfigError::Invalid(
                "auth.access_token_lifetime_secs must be positive".into(),
            ));
        }

        if !self.server.environment.is_development()
            && (self.auth.jwt_secret == DEV_JWT_SECRET || self.auth.jwt_secret.len() < 32)
        {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set (32+ characters) in production".into(),
            ));
        }

        nexus_core::validation::validate_tax_rate_bps(self.sales.tax_rate_bps)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.inventory.sweep_interval_secs == 0 || self.inventory.reservation_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "inventory intervals must be greater than 0".into(),
            ));
        }

        self.notifications
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "nexus", "nexus-crm")
            .map(|dirs| dirs.config_dir().join("api.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sales.tax_rate().bps(), 1800);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ApiConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [sales]
            tax_rate_bps = 1200
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.sales.tax_rate_bps, 1200);
        assert_eq!(config.inventory.reservation_ttl_secs, 300);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NEXUS_PORT", "9100"),
            ("NEXUS_ENVIRONMENT", "production"),
            ("NEXUS_CORS_ORIGINS", "https://a.example, https://b.example"),
        ]
        .into_iter()
        .collect();

        let mut config = ApiConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.server.cors_origins.len(), 2);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = ApiConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "NEXUS_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("NEXUS_PORT"));
    }

    #[test]
    fn test_production_rejects_dev_secret() {
        let mut config = ApiConfig::default();
        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "x".repeat(40);
        assert!(config.validate().is_ok());
    }
}

/// Configuration management for the social core
///
/// Loads configuration from environment variables. Binaries call
/// `dotenvy::dotenv()` first so a local `.env` file is honoured.
use anyhow::{anyhow, Context, Result};
use db_pool::env_utils::parse_env_with_default;
use db_pool::DbConfig;
use resilience::Deadline;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Pool sizing and timeouts
    pub database: DbConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    #[validate(length(min = 1))]
    pub env: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Budget given to an operation when the caller supplies no deadline
    #[validate(range(min = 1, max = 60000))]
    pub default_deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

fn default_deadline_ms() -> u64 {
    5_000
}

impl AppConfig {
    /// Deadline starting now with the configured default budget
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after(Duration::from_millis(self.default_deadline_ms))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let log_format = match std::env::var("LOG_FORMAT") {
            Ok(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
            Err(_) => LogFormat::Text,
        };

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_format,
            default_deadline_ms: parse_env_with_default("DEFAULT_DEADLINE_MS", default_deadline_ms()),
        };
        app.validate().context("invalid application configuration")?;

        let database = DbConfig::from_env("social-core").map_err(|e| anyhow!(e))?;

        Ok(Config { app, database })
    }
}

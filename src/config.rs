use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatcastConfig {
    // Weather provider
    pub api_key: String,
    pub weather_api_url: String,

    // Persistence artifacts
    pub database_path: String,
    pub misfire_file: String,
    pub errors_file: String,

    // Provider quota: calls per window before the cooldown kicks in
    pub rate_limit_ceiling: u32,
    pub rate_limit_cooldown: Duration,

    // Transient network failures
    pub retry_attempts: u32,
    pub retry_delay: Duration,

    // Heating date inference
    pub heating_threshold: f64,
    pub heating_streak: usize,

    pub log_level: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for HeatcastConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("API_KEY_OW").unwrap_or_default(),
            weather_api_url: env::var("WEATHER_API_URL")
                .unwrap_or_else(|_| "http://api.openweathermap.org/data/2.5/forecast".to_string()),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "weather.db".to_string()),
            misfire_file: env::var("MISFIRE_FILE").unwrap_or_else(|_| "misfired.txt".to_string()),
            errors_file: env::var("ERRORS_FILE").unwrap_or_else(|_| "errors.txt".to_string()),
            rate_limit_ceiling: env_or("RATE_LIMIT_CEILING", 59),
            rate_limit_cooldown: Duration::from_secs(env_or("RATE_LIMIT_COOLDOWN_SECS", 70)),
            retry_attempts: env_or("RETRY_ATTEMPTS", 4),
            retry_delay: Duration::from_secs(env_or("RETRY_DELAY_SECS", 660)),
            heating_threshold: env_or("HEATING_THRESHOLD", 8.0),
            heating_streak: env_or("HEATING_STREAK", 5),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl HeatcastConfig {
    pub fn from_env() -> Self {
        dotenv::from_filename("config.env").ok();
        dotenv::dotenv().ok();
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.rate_limit_ceiling == 0 {
            return Err(ConfigError::Invalid("RATE_LIMIT_CEILING must be at least 1".into()));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid("RETRY_ATTEMPTS must be at least 1".into()));
        }
        if self.heating_streak == 0 {
            return Err(ConfigError::Invalid("HEATING_STREAK must be at least 1".into()));
        }
        Ok(())
    }

    /// Same settings with every wait collapsed to zero.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            api_key: "test-key".to_string(),
            weather_api_url: "http://localhost/forecast".to_string(),
            database_path: ":memory:".to_string(),
            misfire_file: "misfired.txt".to_string(),
            errors_file: "errors.txt".to_string(),
            rate_limit_ceiling: 59,
            rate_limit_cooldown: Duration::ZERO,
            retry_attempts: 4,
            retry_delay: Duration::ZERO,
            heating_threshold: 8.0,
            heating_streak: 5,
            log_level: "debug".to_string(),
        }
    }
}

//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OPSDASH_*)
//! 2. TOML config file (if OPSDASH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which of the two cache lifetimes a query family uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    /// Volatile metrics.
    Short,
    /// Slowly-changing reference lists such as city names.
    Long,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OPSDASH_*)
/// 2. TOML config file (if OPSDASH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the remote read service.
    ///
    /// Set via OPSDASH_BASE_URL environment variable.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OPSDASH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OPSDASH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TTL for volatile metrics, in milliseconds.
    ///
    /// Set via OPSDASH_SHORT_TTL_MS environment variable.
    #[serde(default = "default_short_ttl_ms")]
    pub short_ttl_ms: u64,

    /// TTL for reference lists, in milliseconds.
    ///
    /// Set via OPSDASH_LONG_TTL_MS environment variable.
    #[serde(default = "default_long_ttl_ms")]
    pub long_ttl_ms: u64,

    /// Quiet period before a filter change is queried, in milliseconds.
    ///
    /// Set via OPSDASH_DEBOUNCE_MS environment variable.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "opsdash/0.1".into()
}

fn default_short_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_long_ttl_ms() -> u64 {
    1_800_000 // 30 minutes
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            short_ttl_ms: default_short_ttl_ms(),
            long_ttl_ms: default_long_ttl_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn short_ttl(&self) -> Duration {
        Duration::from_millis(self.short_ttl_ms)
    }

    pub fn long_ttl(&self) -> Duration {
        Duration::from_millis(self.long_ttl_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Resolve a TTL class against this configuration.
    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Short => self.short_ttl(),
            TtlClass::Long => self.long_ttl(),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OPSDASH_`
    /// 2. TOML file from `OPSDASH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OPSDASH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OPSDASH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.user_agent, "opsdash/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.short_ttl_ms, 300_000);
        assert_eq!(config.long_ttl_ms, 1_800_000);
        assert_eq!(config.debounce_ms, 300);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.ttl_for(TtlClass::Short), crate::SHORT_TTL);
        assert_eq!(config.ttl_for(TtlClass::Long), crate::LONG_TTL);
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_load_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OPSDASH_DEBOUNCE_MS", "150");
            jail.set_env("OPSDASH_BASE_URL", "https://ops.example.com");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.debounce_ms, 150);
            assert_eq!(config.base_url, "https://ops.example.com");
            assert_eq!(config.timeout_ms, 20_000);
            Ok(())
        });
    }

    #[test]
    fn test_load_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("opsdash.toml", "long_ttl_ms = 3600000\nuser_agent = \"ops-board\"")?;
            jail.set_env("OPSDASH_CONFIG_FILE", "opsdash.toml");
            jail.set_env("OPSDASH_USER_AGENT", "from-env");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.long_ttl_ms, 3_600_000);
            assert_eq!(config.user_agent, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OPSDASH_SHORT_TTL_MS", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}

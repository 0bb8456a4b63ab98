use std::collections::HashMap;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use serde::Deserialize;

/// Engine-wide settings for the delivery subsystem.
///
/// Per-webhook retry policy lives on each [`crate::WebhookConfig`]; these are
/// the process-level knobs and the defaults applied at webhook creation.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Per-attempt HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Capacity of the global delivery log.
    pub log_capacity: usize,
    /// Retry count applied to webhooks created without one.
    pub default_retry_count: u32,
    /// Base retry delay applied to webhooks created without one.
    pub default_retry_delay_ms: u64,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_REQUEST_TIMEOUT_SECS or APP_LOG_CAPACITY
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("request_timeout_secs", 10)?
            .set_default("log_capacity", 100)?
            .set_default("default_retry_count", 3)?
            .set_default("default_retry_delay_ms", 1000)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            log_capacity: 100,
            default_retry_count: 3,
            default_retry_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::load().expect("Failed to load config");

        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.log_capacity, 100);
        assert_eq!(config.default_retry_count, 3);
        assert_eq!(config.default_retry_delay_ms, 1000);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert("request_timeout_secs".to_string(), "30".to_string());
        env_vars.insert("log_capacity".to_string(), "500".to_string());

        let config =
            EngineConfig::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.log_capacity, 500);
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        // We just override the retry count
        env_vars.insert("default_retry_count".to_string(), "5".to_string());

        let config =
            EngineConfig::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.default_retry_count, 5);
        // The other values should use default
        assert_eq!(config.request_timeout_secs, 10);
    }
}

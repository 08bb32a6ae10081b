use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerError;
use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Envconfig, Validate)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; empty selects the in-process store
    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Rolling window length in seconds
    #[envconfig(from = "WINDOW_SECONDS", default = "30")]
    #[validate(range(min = 1, message = "WINDOW_SECONDS must be greater than 0"))]
    pub window_seconds: u64,

    /// Requests allowed per window
    #[envconfig(from = "MAX_REQUESTS_PER_WINDOW", default = "5")]
    #[validate(range(min = 1, message = "MAX_REQUESTS_PER_WINDOW must be greater than 0"))]
    pub max_requests_per_window: u64,

    /// Deadline for a single Redis round trip, in milliseconds
    #[envconfig(from = "REDIS_TIMEOUT_MS", default = "250")]
    #[validate(range(min = 1, max = 60000, message = "REDIS_TIMEOUT_MS must be between 1 and 60000"))]
    pub redis_timeout_ms: u64,

    /// Namespace prepended to every identity key
    #[envconfig(from = "KEY_PREFIX", default = "ratelimit:")]
    #[validate(length(min = 1, message = "KEY_PREFIX cannot be empty"))]
    pub key_prefix: String,

    /// Default log level when RUST_LOG is unset
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ThrottlerError> {
        Config::init_from_env().map_err(|e| ThrottlerError::Configuration(e.to_string()))
    }

    /// Check field ranges and the Redis URL scheme.
    pub fn check(&self) -> Result<(), ThrottlerError> {
        self.validate()
            .map_err(|e| ThrottlerError::Configuration(e.to_string()))?;
        if self.uses_redis() {
            ConfigValidator::validate_redis_url(&self.redis_url)?;
        }
        ConfigValidator::validate_log_level(&self.log_level)?;
        Ok(())
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config::init_from_hashmap(&std::collections::HashMap::new()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.window_seconds, 30);
        assert_eq!(config.max_requests_per_window, 5);
        assert_eq!(config.redis_timeout_ms, 250);
        assert_eq!(config.key_prefix, "ratelimit:");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = Config::init_from_hashmap(&vars(&[
            ("BIND_ADDR", "0.0.0.0:9000"),
            ("REDIS_URL", ""),
            ("WINDOW_SECONDS", "60"),
            ("MAX_REQUESTS_PER_WINDOW", "100"),
            ("KEY_PREFIX", "edge:"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert!(!config.uses_redis());
        assert_eq!(config.window_seconds, 60);
        assert_eq!(config.max_requests_per_window, 100);
        assert_eq!(config.key_prefix, "edge:");
        assert_eq!(config.redis_timeout_ms, 250);
    }

    #[test]
    fn test_unparsable_variable_rejected() {
        let result = Config::init_from_hashmap(&vars(&[("WINDOW_SECONDS", "thirty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.check().is_ok());
        assert!(config.uses_redis());
        assert_eq!(config.redis_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = Config {
            window_seconds: 0,
            ..Config::default()
        };
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("WINDOW_SECONDS"));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = Config {
            max_requests_per_window: 0,
            ..Config::default()
        };
        assert!(matches!(config.check(), Err(ThrottlerError::Configuration(_))));
    }

    #[test]
    fn test_empty_redis_url_selects_memory_store() {
        let config = Config {
            redis_url: String::new(),
            ..Config::default()
        };
        assert!(!config.uses_redis());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_bad_redis_scheme_rejected() {
        let config = Config {
            redis_url: "http://localhost:6379".to_string(),
            ..Config::default()
        };
        assert!(config.check().is_err());
    }
}

use std::env;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub validation: ValidationConfig,
    /// Upper bound for a whole summarize request, provider call included.
    pub request_timeout_secs: u64,
    /// Use the first `X-Forwarded-For` entry as the client identifier.
    pub trust_forwarded_for: bool,
}

/// Settings for the chat-completions provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Page content beyond this many characters is cut before prompting.
    pub content_budget_chars: usize,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Requests allowed per identifier inside one window.
    pub max_requests: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    pub min_content_chars: usize,
    pub max_content_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            provider: ProviderConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validation: ValidationConfig::default(),
            request_timeout_secs: 90,
            trust_forwarded_for: true,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 200,
            temperature: 0.3,
            timeout_secs: 30,
            content_budget_chars: 15_000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
            sweep_interval_secs: 300,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 10,
            max_content_chars: 50_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("OPENAI_API_KEY is not set".to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let port = parse_var(&lookup, "PORT", defaults.server_addr.port())?;

        let provider = ProviderConfig {
            api_key,
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.provider.base_url),
            model: lookup("OPENAI_MODEL").unwrap_or(defaults.provider.model),
            max_tokens: parse_var(&lookup, "OPENAI_MAX_TOKENS", defaults.provider.max_tokens)?,
            temperature: parse_var(&lookup, "OPENAI_TEMPERATURE", defaults.provider.temperature)?,
            timeout_secs: parse_var(&lookup, "PROVIDER_TIMEOUT_SECS", defaults.provider.timeout_secs)?,
            content_budget_chars: parse_var(
                &lookup,
                "PROMPT_CONTENT_BUDGET",
                defaults.provider.content_budget_chars,
            )?,
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests)?,
            window_secs: parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS", defaults.rate_limit.window_secs)?,
            sweep_interval_secs: parse_var(
                &lookup,
                "RATE_LIMIT_SWEEP_SECS",
                defaults.rate_limit.sweep_interval_secs,
            )?,
        };
        if rate_limit.window_secs == 0 || rate_limit.sweep_interval_secs == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_SECS and RATE_LIMIT_SWEEP_SECS must be positive".to_string(),
            ));
        }

        let validation = ValidationConfig {
            min_content_chars: parse_var(&lookup, "CONTENT_MIN_CHARS", defaults.validation.min_content_chars)?,
            max_content_chars: parse_var(&lookup, "CONTENT_MAX_CHARS", defaults.validation.max_content_chars)?,
        };
        if validation.min_content_chars > validation.max_content_chars {
            return Err(AppError::ConfigError(
                "CONTENT_MIN_CHARS must not exceed CONTENT_MAX_CHARS".to_string(),
            ));
        }

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            provider,
            rate_limit,
            validation,
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            trust_forwarded_for: parse_var(&lookup, "TRUST_FORWARDED_FOR", defaults.trust_forwarded_for)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.provider.api_key, "sk-test");
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert_eq!(config.provider.max_tokens, 200);
        assert_eq!(config.provider.content_budget_chars, 15_000);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.validation.min_content_chars, 10);
        assert_eq!(config.validation.max_content_chars, 50_000);
        assert!(config.trust_forwarded_for);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "8080")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("RATE_LIMIT_MAX_REQUESTS", "20"),
            ("OPENAI_TEMPERATURE", "0.7"),
            ("TRUST_FORWARDED_FOR", "false"),
        ]))
        .unwrap();

        assert_eq!(config.server_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.rate_limit.max_requests, 20);
        assert!((config.provider.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("PORT")));

        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("CONTENT_MIN_CHARS", "100"),
            ("CONTENT_MAX_CHARS", "50"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::estimation::service::RetryPolicy;

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub retry: RetryPolicy,
    pub port: u16,
    pub rust_log: String,
}

/// Settings for the model client. The timeout bounds every outbound call.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = var("ANTHROPIC_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .context("Required environment variable 'ANTHROPIC_API_KEY' is not set")?;

        let timeout_secs: u64 = parse_or(&var, "LLM_TIMEOUT_SECS", 60)?;
        ensure!(timeout_secs > 0, "LLM_TIMEOUT_SECS must be greater than 0");

        let max_invocation_attempts: u32 = parse_or(&var, "LLM_MAX_ATTEMPTS", 3)?;
        ensure!(max_invocation_attempts >= 1, "LLM_MAX_ATTEMPTS must be at least 1");

        let max_contract_attempts: u32 = parse_or(&var, "CONTRACT_MAX_ATTEMPTS", 2)?;
        ensure!(max_contract_attempts >= 1, "CONTRACT_MAX_ATTEMPTS must be at least 1");

        let backoff_ms: u64 = parse_or(&var, "LLM_RETRY_BACKOFF_MS", 1000)?;

        Ok(Config {
            llm: LlmSettings {
                api_key,
                api_url: var("ANTHROPIC_API_URL")
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string()),
                timeout: Duration::from_secs(timeout_secs),
            },
            retry: RetryPolicy {
                max_invocation_attempts,
                max_contract_attempts,
                backoff_base: Duration::from_millis(backoff_ms),
            },
            port: parse_or(&var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[("ANTHROPIC_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.llm.api_url, DEFAULT_ANTHROPIC_API_URL);
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_invocation_attempts, 3);
        assert_eq!(config.retry.max_contract_attempts, 2);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(1000));
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("ANTHROPIC_API_URL", "http://localhost:9999/v1/messages"),
            ("LLM_TIMEOUT_SECS", "15"),
            ("LLM_MAX_ATTEMPTS", "5"),
            ("CONTRACT_MAX_ATTEMPTS", "1"),
            ("LLM_RETRY_BACKOFF_MS", "250"),
            ("PORT", "3000"),
        ]))
        .unwrap();
        assert_eq!(config.llm.api_url, "http://localhost:9999/v1/messages");
        assert_eq!(config.llm.timeout, Duration::from_secs(15));
        assert_eq!(config.retry.max_invocation_attempts, 5);
        assert_eq!(config.retry.max_contract_attempts, 1);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(250));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_missing_api_key_fails() {
        let err = Config::from_vars(vars(&[])).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LLM_TIMEOUT_SECS"));
    }

    #[test]
    fn test_malformed_number_rejected() {
        let err = Config::from_vars(vars(&[("ANTHROPIC_API_KEY", "sk-test"), ("PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::from_vars(vars(&[("ANTHROPIC_API_KEY", "sk-secret")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}

//! Configuration structures for the extraction pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{Backoff, PollPolicy};
use crate::error::{InvxError, Result};
use crate::models::schema::CanonicalSchema;

/// Environment variable overriding the configured model.
pub const MODEL_ENV: &str = "INVX_MODEL";

/// Main configuration for the invx pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvxConfig {
    /// Remote service configuration.
    pub service: ServiceConfig,

    /// Outbound call rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Document readiness polling.
    pub polling: PollingConfig,

    /// Schema matching configuration.
    pub matching: MatchingConfig,

    /// Batch analysis configuration.
    pub batch: BatchConfig,
}

/// Remote service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Model identifier.
    pub model: String,

    /// API base URL.
    pub base_url: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling threshold.
    pub top_p: f32,

    /// Top-k sampling.
    pub top_k: u32,

    /// Maximum tokens per response.
    pub max_output_tokens: u32,

    /// Requested response MIME type (empty = service default).
    pub response_mime_type: String,

    /// Timeout for a single HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "application/json".to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl ServiceConfig {
    /// Read the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(InvxError::Config(format!(
                "{} environment variable not set",
                self.api_key_env
            ))),
        }
    }

    /// Model identifier, honoring the `INVX_MODEL` override.
    pub fn resolve_model(&self) -> Result<String> {
        let model = std::env::var(MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.model.clone());

        if model.trim().is_empty() {
            return Err(InvxError::Config("model identifier is not set".to_string()));
        }
        Ok(model)
    }
}

/// Outbound call rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum interval between remote calls, in milliseconds.
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 4000,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Backoff between readiness polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Same interval every round.
    Fixed,
    /// Interval multiplied by `factor` each round, capped at `max_interval_secs`.
    Exponential { factor: f64, max_interval_secs: u64 },
}

/// Document readiness polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Initial interval between polls, in seconds.
    pub interval_secs: u64,

    /// Backoff policy.
    pub backoff: BackoffConfig,

    /// Give up after this many seconds (`null` = wait forever).
    pub timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            backoff: BackoffConfig::Fixed,
            timeout_secs: Some(600),
        }
    }
}

impl PollingConfig {
    /// Convert to the runtime poll policy.
    pub fn to_policy(&self) -> PollPolicy {
        let backoff = match self.backoff {
            BackoffConfig::Fixed => Backoff::Fixed,
            BackoffConfig::Exponential {
                factor,
                max_interval_secs,
            } => Backoff::Exponential {
                factor,
                max_interval: Duration::from_secs(max_interval_secs),
            },
        };

        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            backoff,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Schema matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Raw input longer than this many characters is truncated.
    pub max_raw_length: usize,

    /// Text appended to truncated input.
    pub truncation_marker: String,

    /// JSON column table replacing the built-in schema.
    pub schema_path: Option<PathBuf>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_raw_length: 1_000_000,
            truncation_marker: "\n...[truncated]".to_string(),
            schema_path: None,
        }
    }
}

impl MatchingConfig {
    /// Load the configured schema, or the built-in one.
    pub fn load_schema(&self) -> Result<CanonicalSchema> {
        match &self.schema_path {
            Some(path) => CanonicalSchema::from_file(path),
            None => Ok(CanonicalSchema::electricity_invoice()),
        }
    }
}

/// Batch analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// MIME type documents are registered with.
    pub mime_type: String,

    /// Prompt used when the caller supplies none.
    pub default_prompt: String,

    /// Worker threads for per-document extraction.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mime_type: "application/pdf".to_string(),
            default_prompt: crate::batch::DEFAULT_ANALYSIS_PROMPT.to_string(),
            workers: 4,
        }
    }
}

impl InvxConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: InvxConfig = serde_json::from_str(
            r#"{"rate_limit": {"min_interval_ms": 500}, "polling": {"timeout_secs": null}}"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.min_interval(), Duration::from_millis(500));
        assert_eq!(config.polling.timeout_secs, None);
        assert_eq!(config.polling.interval_secs, 10);
        assert_eq!(config.matching.max_raw_length, 1_000_000);
        assert_eq!(config.service.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_polling_policy_conversion() {
        let polling = PollingConfig {
            interval_secs: 2,
            backoff: BackoffConfig::Exponential {
                factor: 2.0,
                max_interval_secs: 30,
            },
            timeout_secs: Some(120),
        };

        let policy = polling.to_policy();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                factor: 2.0,
                max_interval: Duration::from_secs(30)
            }
        );
        assert_eq!(policy.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_backoff_serialization() {
        let json = serde_json::to_value(&BackoffConfig::Exponential {
            factor: 1.5,
            max_interval_secs: 60,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "exponential", "factor": 1.5, "max_interval_secs": 60 })
        );
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let service = ServiceConfig {
            api_key_env: "INVX_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(service.resolve_api_key(), Err(InvxError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = InvxConfig::default();
        config.batch.workers = 2;
        config.save(&path).unwrap();

        let loaded = InvxConfig::from_file(&path).unwrap();
        assert_eq!(loaded.batch.workers, 2);
        assert_eq!(loaded.batch.mime_type, "application/pdf");
    }
}

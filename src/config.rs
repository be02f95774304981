//! Configuration.
//!
//! Every field has a default, so an empty JSON object or an empty
//! environment yields a working configuration. Environment overrides use the
//! `CHUNKWISE_` prefix.

use crate::error::{Error, Result};
use crate::tokens::limits::{DEFAULT_CONTEXT_WINDOW, DEFAULT_TPM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Semantic chunker settings.
    pub chunking: ChunkingConfig,
    /// Token budget settings.
    pub budget: BudgetConfig,
    /// Rate limiter settings.
    pub rate_limit: RateLimitConfig,
    /// Map-phase dispatch settings.
    pub dispatch: DispatchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Semantic chunker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// When false, documents are always processed in a single pass.
    pub enabled: bool,
    /// Total context budget of a stage, in tokens.
    pub max_tokens: usize,
    /// Tokens of trailing context carried into the next chunk.
    pub overlap_tokens: usize,
    /// Minimum acceptable coverage ratio (chars and tokens).
    pub min_coverage_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 25_000,
            overlap_tokens: 500,
            min_coverage_ratio: 0.9,
        }
    }
}

/// Token budget settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Fraction of the context window that may be reserved.
    pub safety_ratio: f64,
    /// Context window for models missing from every table.
    pub default_context_window: usize,
    /// Per-model context window overrides.
    pub context_windows: HashMap<String, usize>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            safety_ratio: 0.8,
            default_context_window: DEFAULT_CONTEXT_WINDOW,
            context_windows: HashMap::new(),
        }
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Per-model tokens-per-minute overrides over the built-in table.
    pub tpm_per_model: HashMap<String, u64>,
    /// Quota for models missing from every table.
    pub default_tpm: u64,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Fraction of the quota admitted before waiting.
    pub threshold_ratio: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tpm_per_model: HashMap::new(),
            default_tpm: DEFAULT_TPM,
            window_secs: 60,
            threshold_ratio: 0.9,
        }
    }
}

impl RateLimitConfig {
    /// Sliding window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Map-phase dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum concurrently in-flight chunk jobs.
    pub workers: usize,
    /// Tokens held back for the backend's response when chunking.
    pub response_reserve_tokens: usize,
    /// How long a job waits for budget before failing.
    pub budget_wait_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            response_reserve_tokens: 2_000,
            budget_wait_timeout_ms: 30_000,
        }
    }
}

impl DispatchConfig {
    /// Budget wait timeout.
    #[must_use]
    pub const fn budget_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.budget_wait_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Log severity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace.
    Trace,
    /// Debug.
    Debug,
    /// Info.
    #[default]
    Info,
    /// Warn.
    Warn,
    /// Error.
    Error,
}

impl LogLevel {
    /// Filter directive name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Error::config(format!("unknown log level: {other}"))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::config(format!("unknown log format: {other}"))),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Minimum level when `RUST_LOG` is unset.
    pub level: LogLevel,
}

impl Config {
    /// Parses a JSON configuration and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overridden by `CHUNKWISE_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable does not parse or the result
    /// is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable does not parse or the result
    /// is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        override_with(&lookup, "CHUNKWISE_ENABLE_CHUNKING", &mut config.chunking.enabled)?;
        override_with(&lookup, "CHUNKWISE_MAX_TOKENS", &mut config.chunking.max_tokens)?;
        override_with(&lookup, "CHUNKWISE_OVERLAP_TOKENS", &mut config.chunking.overlap_tokens)?;
        override_with(
            &lookup,
            "CHUNKWISE_MIN_COVERAGE_RATIO",
            &mut config.chunking.min_coverage_ratio,
        )?;
        override_with(&lookup, "CHUNKWISE_SAFETY_RATIO", &mut config.budget.safety_ratio)?;
        override_with(
            &lookup,
            "CHUNKWISE_DEFAULT_CONTEXT_WINDOW",
            &mut config.budget.default_context_window,
        )?;
        override_with(&lookup, "CHUNKWISE_DEFAULT_TPM", &mut config.rate_limit.default_tpm)?;
        override_with(&lookup, "CHUNKWISE_WORKERS", &mut config.dispatch.workers)?;
        override_with(
            &lookup,
            "CHUNKWISE_RESPONSE_RESERVE_TOKENS",
            &mut config.dispatch.response_reserve_tokens,
        )?;
        override_with(&lookup, "CHUNKWISE_LOG_LEVEL", &mut config.logging.level)?;
        override_with(&lookup, "CHUNKWISE_LOG_FORMAT", &mut config.logging.format)?;

        config.validate()?;
        Ok(config)
    }

    /// Validates all fields, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing each invalid field.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.chunking.max_tokens == 0 {
            errors.push("max_tokens must be positive".to_string());
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            errors.push(format!(
                "overlap_tokens ({}) must be less than max_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.max_tokens
            ));
        }
        for (name, value) in [
            ("min_coverage_ratio", self.chunking.min_coverage_ratio),
            ("safety_ratio", self.budget.safety_ratio),
            ("threshold_ratio", self.rate_limit.threshold_ratio),
        ] {
            if value.is_nan() || value <= 0.0 || value > 1.0 {
                errors.push(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if self.budget.default_context_window == 0 {
            errors.push("default_context_window must be positive".to_string());
        }
        if self.rate_limit.window_secs == 0 {
            errors.push("window_secs must be positive".to_string());
        }
        if self.dispatch.workers == 0 {
            errors.push("workers must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::config(errors.join("; ")))
        }
    }
}

fn override_with<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.chunking.enabled);
        assert_eq!(config.chunking.max_tokens, 25_000);
        assert_eq!(config.chunking.overlap_tokens, 500);
        assert!((config.budget.safety_ratio - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.default_tpm, 30_000);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.dispatch.workers, 3);
        assert_eq!(config.dispatch.budget_wait_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json_str(
            r#"{"chunking": {"max_tokens": 1000, "overlap_tokens": 200},
                "rate_limit": {"tpm_per_model": {"gpt-4o": 60000}},
                "logging": {"format": "json"}}"#,
        )
        .unwrap();
        assert_eq!(config.chunking.max_tokens, 1000);
        assert!(config.chunking.enabled);
        assert_eq!(config.rate_limit.tpm_per_model["gpt-4o"], 60_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_from_json_empty_object() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            Config::from_json_str("{not json"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.chunking.max_tokens = 100;
        config.chunking.overlap_tokens = 100;
        config.budget.safety_ratio = 1.5;
        config.dispatch.workers = 0;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("overlap_tokens"));
        assert!(message.contains("safety_ratio"));
        assert!(message.contains("workers"));
    }

    #[test]
    fn test_validate_zero_max_tokens() {
        let mut config = Config::default();
        config.chunking.max_tokens = 0;
        config.chunking.overlap_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(env(&[
            ("CHUNKWISE_MAX_TOKENS", "4000"),
            ("CHUNKWISE_OVERLAP_TOKENS", " 100 "),
            ("CHUNKWISE_ENABLE_CHUNKING", "false"),
            ("CHUNKWISE_WORKERS", "8"),
            ("CHUNKWISE_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();
        assert_eq!(config.chunking.max_tokens, 4000);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert!(!config.chunking.enabled);
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = Config::from_lookup(env(&[("CHUNKWISE_MAX_TOKENS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CHUNKWISE_MAX_TOKENS"));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}

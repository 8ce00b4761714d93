//! Configuration management for radiolap.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::align::AsOfDirection;
use crate::correlate::CorrelationPolicy;
use crate::error::{Error, Result};
use crate::narrative::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "radiolap";

/// Prefix for environment overrides; nested keys are separated by `__`.
const ENV_PREFIX: &str = "RADIOLAP_";

/// Conventional variable holding the language-model API key.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. `OPENAI_API_KEY` (for `narrative.api_key`)
/// 2. Environment variables (prefixed with `RADIOLAP_`, `__` between levels)
/// 3. TOML config file at `~/.config/radiolap/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session data API.
    pub gateway: GatewayConfig,
    /// Event-to-lap correlation.
    pub correlation: CorrelationConfig,
    /// Language-model summaries.
    pub narrative: NarrativeConfig,
    /// Radio transcription.
    pub transcription: TranscriptionConfig,
}

/// Session data API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// API base URL.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of responses kept in the LRU cache.
    pub cache_capacity: usize,
    /// User-Agent header.
    pub user_agent: String,
}

/// Correlation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Strategy placing radio messages on laps.
    pub policy: CorrelationPolicy,
    /// Direction of the position/lap as-of join.
    pub as_of_direction: AsOfDirection,
    /// Farthest a nearest-start match may be from the lap start, in seconds.
    pub nearest_tolerance_secs: Option<f64>,
}

/// Narrative (chat completion) configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// API key. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Chat model.
    pub model: String,
    /// Default sampling temperature.
    pub temperature: f64,
    /// Default completion token limit.
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Total attempts per request.
    pub max_attempts: u32,
    /// Exponential backoff base in seconds.
    pub backoff_multiplier_secs: f64,
    /// Shortest wait between attempts in seconds.
    pub backoff_min_secs: f64,
    /// Longest wait between attempts in seconds.
    pub backoff_max_secs: f64,
}

/// Transcription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Transcription model.
    pub model: String,
    /// Whether `--transcribe` is honoured.
    pub enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openf1.org/v1".to_string(),
            timeout_secs: 30,
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            user_agent: concat!("radiolap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 60,
            max_attempts: 3,
            backoff_multiplier_secs: 1.0,
            backoff_min_secs: 4.0,
            backoff_max_secs: 10.0,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            enabled: true,
        }
    }
}

impl std::fmt::Debug for NarrativeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_multiplier_secs", &self.backoff_multiplier_secs)
            .field("backoff_min_secs", &self.backoff_min_secs)
            .field("backoff_max_secs", &self.backoff_max_secs)
            .finish()
    }
}

impl GatewayConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cache capacity as a non-zero size.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is zero.
    pub fn cache_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.cache_capacity)
            .ok_or_else(|| Error::config_validation("gateway.cache_capacity must be greater than 0"))
    }
}

impl CorrelationConfig {
    /// Nearest-start tolerance, if configured.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn nearest_tolerance(&self) -> Option<chrono::Duration> {
        self.nearest_tolerance_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| chrono::Duration::milliseconds((secs * 1000.0).round() as i64))
    }
}

impl NarrativeConfig {
    /// The API key, if set and not blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy built from the backoff settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let secs = |value: f64| Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO);
        RetryPolicy {
            max_attempts: self.max_attempts,
            multiplier: secs(self.backoff_multiplier_secs),
            min_delay: secs(self.backoff_min_secs),
            max_delay: secs(self.backoff_max_secs),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config: Config = Self::figment(config_path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered configuration sources, lowest precedence first.
    #[must_use]
    pub fn figment(config_path: Option<PathBuf>) -> Figment {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&[API_KEY_ENV])
                    .map(|_| "narrative.api_key".into()),
            )
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_url("gateway.base_url", &self.gateway.base_url)?;
        validate_url("narrative.base_url", &self.narrative.base_url)?;

        if self.gateway.timeout_secs == 0 {
            return Err(Error::config_validation(
                "gateway.timeout_secs must be greater than 0",
            ));
        }
        self.gateway.cache_capacity()?;

        if let Some(tolerance) = self.correlation.nearest_tolerance_secs {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(Error::config_validation(format!(
                    "correlation.nearest_tolerance_secs must be a non-negative number, got {tolerance}"
                )));
            }
        }

        let narrative = &self.narrative;
        if !(0.0..=2.0).contains(&narrative.temperature) {
            return Err(Error::config_validation(format!(
                "narrative.temperature must be between 0 and 2, got {}",
                narrative.temperature
            )));
        }
        if narrative.max_tokens == 0 {
            return Err(Error::config_validation(
                "narrative.max_tokens must be greater than 0",
            ));
        }
        if narrative.timeout_secs == 0 {
            return Err(Error::config_validation(
                "narrative.timeout_secs must be greater than 0",
            ));
        }
        if narrative.max_attempts == 0 {
            return Err(Error::config_validation(
                "narrative.max_attempts must be greater than 0",
            ));
        }
        for (name, value) in [
            ("narrative.backoff_multiplier_secs", narrative.backoff_multiplier_secs),
            ("narrative.backoff_min_secs", narrative.backoff_min_secs),
            ("narrative.backoff_max_secs", narrative.backoff_max_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config_validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if narrative.backoff_min_secs > narrative.backoff_max_secs {
            return Err(Error::config_validation(format!(
                "narrative.backoff_min_secs ({}) cannot be greater than narrative.backoff_max_secs ({})",
                narrative.backoff_min_secs, narrative.backoff_max_secs
            )));
        }

        if self.transcription.model.trim().is_empty() {
            return Err(Error::config_validation(
                "transcription.model must not be empty",
            ));
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let url = reqwest::Url::parse(value).map_err(|e| {
        Error::config_validation(format!("{field} is not a valid URL ({value}): {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::config_validation(format!(
            "{field} must use http or https, got {}",
            url.scheme()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.gateway.base_url, "https://api.openf1.org/v1");
        assert_eq!(config.gateway.cache_capacity, 128);
        assert_eq!(config.correlation.policy, CorrelationPolicy::Containment);
        assert_eq!(config.correlation.as_of_direction, AsOfDirection::Nearest);
        assert_eq!(config.narrative.model, "gpt-3.5-turbo");
        assert_eq!(config.transcription.model, "whisper-1");
        assert!(config.narrative.api_key.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_url() {
        let mut config = Config::default();
        config.gateway.base_url = "not a url".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("gateway.base_url"));

        let mut config = Config::default();
        config.narrative.base_url = "ftp://example.com".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("narrative.base_url"));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.gateway.cache_capacity = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cache_capacity"));
    }

    #[test]
    fn test_validate_zero_timeouts_and_attempts() {
        let mut config = Config::default();
        config.gateway.timeout_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("gateway.timeout_secs"));

        let mut config = Config::default();
        config.narrative.timeout_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("narrative.timeout_secs"));

        let mut config = Config::default();
        config.narrative.max_attempts = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validate_inverted_backoff() {
        let mut config = Config::default();
        config.narrative.backoff_min_secs = 20.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("backoff_min_secs"));
    }

    #[test]
    fn test_validate_temperature_range() {
        let mut config = Config::default();
        config.narrative.temperature = 2.5;
        assert!(config.validate().unwrap_err().to_string().contains("temperature"));
        config.narrative.temperature = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_negative_tolerance() {
        let mut config = Config::default();
        config.correlation.nearest_tolerance_secs = Some(-1.0);
        assert!(config.validate().unwrap_err().to_string().contains("nearest_tolerance_secs"));
    }

    #[test]
    fn test_nearest_tolerance() {
        let mut correlation = CorrelationConfig::default();
        assert_eq!(correlation.nearest_tolerance(), None);
        correlation.nearest_tolerance_secs = Some(1.5);
        assert_eq!(
            correlation.nearest_tolerance(),
            Some(chrono::Duration::milliseconds(1500))
        );
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = NarrativeConfig::default().retry_policy();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_api_key_blank_is_none() {
        let mut narrative = NarrativeConfig::default();
        narrative.api_key = Some("  ".to_string());
        assert_eq!(narrative.api_key(), None);
        narrative.api_key = Some("sk-abc".to_string());
        assert_eq!(narrative.api_key(), Some("sk-abc"));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.narrative.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("radiolap"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_toml_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "radiolap.toml",
                r#"
                [gateway]
                cache_capacity = 16

                [correlation]
                policy = "nearest-start"
                as_of_direction = "backward"
                nearest_tolerance_secs = 30.0
                "#,
            )?;
            let config = Config::load_from(Some(PathBuf::from("radiolap.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.gateway.cache_capacity, 16);
            assert_eq!(config.gateway.timeout_secs, 30);
            assert_eq!(config.correlation.policy, CorrelationPolicy::NearestStart);
            assert_eq!(config.correlation.as_of_direction, AsOfDirection::Backward);
            assert_eq!(config.correlation.nearest_tolerance_secs, Some(30.0));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("radiolap.toml", "[gateway]\ncache_capacity = 16\n")?;
            jail.set_env("RADIOLAP_GATEWAY__CACHE_CAPACITY", "64");
            jail.set_env("RADIOLAP_NARRATIVE__MODEL", "gpt-4o-mini");
            jail.set_env("OPENAI_API_KEY", "sk-from-env");
            let config = Config::load_from(Some(PathBuf::from("radiolap.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.gateway.cache_capacity, 64);
            assert_eq!(config.narrative.model, "gpt-4o-mini");
            assert_eq!(config.narrative.api_key(), Some("sk-from-env"));
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("radiolap.toml", "[narrative]\nmax_attempts = 0\n")?;
            let err = Config::load_from(Some(PathBuf::from("radiolap.toml"))).unwrap_err();
            assert!(err.to_string().contains("max_attempts"));
            Ok(())
        });
    }
}

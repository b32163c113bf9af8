//! Exporter settings, read from a TOML file or the environment.

use crate::ConfigError;
use serde::Deserialize;
use std::{fmt, path::Path, time::Duration};

const DEFAULT_INTERVAL_MS: u64 = 10_000;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

const URL_VAR: &str = "PIZZA_METRICS_URL";
const API_KEY_VAR: &str = "PIZZA_METRICS_API_KEY";
const SOURCE_VAR: &str = "PIZZA_METRICS_SOURCE";
const INTERVAL_VAR: &str = "PIZZA_METRICS_INTERVAL_MS";
const TIMEOUT_VAR: &str = "PIZZA_METRICS_TIMEOUT_MS";

/// Where and how often to push metrics.
///
/// ```toml
/// url = "https://otlp-gateway.example.net/otlp/v1/metrics"
/// api_key = "123456:glc_..."
/// source = "jwt-pizza-service-dev"
/// interval_ms = 10000   # optional
/// timeout_ms = 5000     # optional
/// ```
#[derive(Clone, Deserialize)]
pub struct ExporterConfig {
    /// Collector endpoint receiving the JSON POST.
    pub url: String,
    /// Sent as `Authorization: Bearer <api_key>`.
    pub api_key: String,
    /// Value of the `source` attribute on every data point.
    pub source: String,
    /// Export period.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound on a single push, connect included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("source", &self.source)
            .field("interval_ms", &self.interval_ms)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ExporterConfig {
    /// Config with the default interval and timeout.
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            source: source.into(),
            interval_ms: DEFAULT_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `PIZZA_METRICS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ExporterConfig::from_env`], with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| lookup(var).ok_or(ConfigError::Missing(var));
        let millis = |var: &'static str, default: u64| match lookup(var) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var, value }),
        };

        let config = Self {
            url: required(URL_VAR)?,
            api_key: required(API_KEY_VAR)?,
            source: required(SOURCE_VAR)?,
            interval_ms: millis(INTERVAL_VAR, DEFAULT_INTERVAL_MS)?,
            timeout_ms: millis(TIMEOUT_VAR, DEFAULT_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the exporter cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.url).map_err(|err| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: err.to_string(),
        })?;
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("interval_ms"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("timeout_ms"));
        }
        Ok(())
    }

    /// Export period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Push timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn toml_fills_defaults() {
        let config = ExporterConfig::from_toml(
            r#"
            url = "https://collector.example.com/otlp/v1/metrics"
            api_key = "secret"
            source = "jwt-pizza-dev"
            "#,
        )
        .unwrap();
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.source, "jwt-pizza-dev");
    }

    #[test]
    fn toml_overrides() {
        let config = ExporterConfig::from_toml(
            r#"
            url = "http://localhost:4318/v1/metrics"
            api_key = "k"
            source = "s"
            interval_ms = 250
            timeout_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn env_lookup() {
        let config = ExporterConfig::from_lookup(env(&[
            (URL_VAR, "https://collector.example.com"),
            (API_KEY_VAR, "secret"),
            (SOURCE_VAR, "prod"),
            (INTERVAL_VAR, " 2000 "),
        ]))
        .unwrap();
        assert_eq!(config.interval(), Duration::from_secs(2));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn env_missing_key() {
        let err = ExporterConfig::from_lookup(env(&[
            (URL_VAR, "https://collector.example.com"),
            (SOURCE_VAR, "prod"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(API_KEY_VAR)));
    }

    #[test]
    fn env_bad_number() {
        let err = ExporterConfig::from_lookup(env(&[
            (URL_VAR, "https://collector.example.com"),
            (API_KEY_VAR, "secret"),
            (SOURCE_VAR, "prod"),
            (TIMEOUT_VAR, "5s"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: TIMEOUT_VAR, .. }));
    }

    #[test]
    fn rejects_bad_settings() {
        let mut config = ExporterConfig::new("not a url", "k", "s");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));

        config.url = "https://collector.example.com".into();
        config.interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("interval_ms"))
        ));
    }

    #[test]
    fn unreadable_or_malformed_file() {
        let err = ExporterConfig::from_file("/nonexistent/pizza-metrics.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let err = ExporterConfig::from_toml("url = \"https://collector.example.com\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn debug_hides_api_key() {
        let config = ExporterConfig::new("https://collector.example.com", "hunter2", "s");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}

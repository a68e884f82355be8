use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::batch::Pacing;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_COOLDOWN_SECS: u64 = 2;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingApiKey(&'static str),
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Extraction settings read once at startup.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: Url,
    pub cooldown: Duration,
    pub staging_dir: PathBuf,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base.as_str())
            .field("cooldown", &self.cooldown)
            .field("staging_dir", &self.staging_dir)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    ///
    /// The API key is checked first so a missing credential is reported
    /// before anything else.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_VAR))?;

        let model = lookup("DATASHEET_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base = lookup("DATASHEET_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&base).map_err(|_| ConfigError::InvalidBaseUrl(base.clone()))?;
        if api_base.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(base));
        }

        let cooldown = read_secs(&lookup, "DATASHEET_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)?;
        let connect_timeout = read_secs(
            &lookup,
            "DATASHEET_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let request_timeout = read_secs(
            &lookup,
            "DATASHEET_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let staging_dir = lookup("DATASHEET_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("datasheet-staging"));

        Ok(Self {
            api_key,
            model,
            api_base,
            cooldown,
            staging_dir,
            connect_timeout,
            request_timeout,
        })
    }

    #[must_use]
    pub const fn pacing(&self) -> Pacing {
        if self.cooldown.is_zero() {
            Pacing::Disabled
        } else {
            Pacing::Fixed(self.cooldown)
        }
    }
}

fn read_secs<F>(lookup: &F, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(Duration::from_secs(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let result = Config::from_lookup(lookup_from(&[("DATASHEET_MODEL", "x")]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingApiKey("GEMINI_API_KEY"));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let result = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")]));
        assert!(matches!(result, Err(ConfigError::MissingApiKey(_))));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base.as_str(), "https://generativelanguage.googleapis.com/");
        assert_eq!(config.cooldown, Duration::from_secs(2));
        assert_eq!(config.pacing(), Pacing::Fixed(Duration::from_secs(2)));
        assert!(config.staging_dir.ends_with("datasheet-staging"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("DATASHEET_MODEL", "gemini-2.5-pro"),
            ("DATASHEET_COOLDOWN_SECS", "0"),
            ("DATASHEET_STAGING_DIR", "/var/tmp/sheets"),
            ("DATASHEET_API_BASE", "http://localhost:9000"),
        ]))
        .unwrap();

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.pacing(), Pacing::Disabled);
        assert_eq!(config.staging_dir, PathBuf::from("/var/tmp/sheets"));
        assert_eq!(config.api_base.host_str(), Some("localhost"));
    }

    #[test]
    fn test_invalid_values() {
        let result = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("DATASHEET_COOLDOWN_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidNumber { var: "DATASHEET_COOLDOWN_SECS", .. })));

        let result = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("DATASHEET_API_BASE", "not a url"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "secret-key")])).unwrap();
        let rendered = format!("{config:?}");

        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}

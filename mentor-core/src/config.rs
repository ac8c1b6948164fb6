use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "MENTOR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{var} must be a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Client settings: YAML file first, then `MENTOR_*` environment overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    /// PostgREST root of the plan cache; in-memory cache when unset.
    pub cache_url: Option<String>,
    pub cache_key: Option<String>,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".into(),
            cache_url: None,
            cache_key: None,
            retries: 2,
            retry_delay_ms: 1000,
            poll_interval_ms: 2000,
        }
    }
}

impl ClientConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// `MENTOR_CONFIG` if set, defaults otherwise, then env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Self::from_path(path)?,
            _ => Self::default(),
        };
        cfg.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

        if let Some(base) = get("MENTOR_API_BASE") {
            self.api_base = base;
        }
        if let Some(url) = get("MENTOR_CACHE_URL") {
            self.cache_url = Some(url);
        }
        if let Some(key) = get("MENTOR_CACHE_KEY") {
            self.cache_key = Some(key);
        }
        if let Some(v) = get("MENTOR_RETRIES") {
            self.retries = parse_number("MENTOR_RETRIES", v)?;
        }
        if let Some(v) = get("MENTOR_RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_number("MENTOR_RETRY_DELAY_MS", v)?;
        }
        if let Some(v) = get("MENTOR_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("MENTOR_POLL_INTERVAL_MS", v)?;
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}

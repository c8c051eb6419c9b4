//! Service configuration.
//!
//! # Environment Variables
//!
//! | Variable | Fallback | Default |
//! |----------|----------|---------|
//! | `MARKETLENS_<PROVIDER>_API_KEY` | `<PROVIDER>_API_KEY` | unset (adapter disabled) |
//! | `MARKETLENS_SEC_USER_AGENT` | `SEC_USER_AGENT` | [`DEFAULT_SEC_USER_AGENT`] |
//! | `MARKETLENS_USE_LIVE_DATA` | - | `true` |
//! | `MARKETLENS_FIXTURE_PATH` | - | unset |
//! | `MARKETLENS_ENABLE_FALLBACK` | - | `true` |
//! | `MARKETLENS_HTTP_TIMEOUT_MS` | - | `10000` |

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::{CoreError, ProviderId};

/// Contact string SEC EDGAR requires in the User-Agent of automated clients.
pub const DEFAULT_SEC_USER_AGENT: &str = "marketlens/0.1 contact@marketlens.invalid";

/// Where the service reads its data from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    #[default]
    Live,
    Fixture,
}

/// Runtime configuration for [`UnifiedService`](crate::UnifiedService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub mode: DataMode,
    /// Credential per provider. A missing key disables that adapter.
    pub api_keys: BTreeMap<ProviderId, String>,
    pub sec_user_agent: String,
    pub fixture_path: Option<PathBuf>,
    pub enable_fallback: bool,
    pub http_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mode: DataMode::Live,
            api_keys: BTreeMap::new(),
            sec_user_agent: String::from(DEFAULT_SEC_USER_AGENT),
            fixture_path: None,
            enable_fallback: true,
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        for provider in ProviderId::LIVE {
            let prefixed = format!("MARKETLENS_{}_API_KEY", provider.env_name());
            let plain = format!("{}_API_KEY", provider.env_name());
            if let Some(key) = read(&prefixed).or_else(|| read(&plain)) {
                config.api_keys.insert(provider, key);
            }
        }

        if let Some(agent) = read("MARKETLENS_SEC_USER_AGENT").or_else(|| read("SEC_USER_AGENT")) {
            config.sec_user_agent = agent;
        }

        if let Some(value) = read("MARKETLENS_USE_LIVE_DATA") {
            config.mode = if parse_bool("MARKETLENS_USE_LIVE_DATA", &value)? {
                DataMode::Live
            } else {
                DataMode::Fixture
            };
        }

        config.fixture_path = read("MARKETLENS_FIXTURE_PATH").map(PathBuf::from);

        if let Some(value) = read("MARKETLENS_ENABLE_FALLBACK") {
            config.enable_fallback = parse_bool("MARKETLENS_ENABLE_FALLBACK", &value)?;
        }

        if let Some(value) = read("MARKETLENS_HTTP_TIMEOUT_MS") {
            config.http_timeout_ms = value
                .parse::<u64>()
                .ok()
                .filter(|timeout| *timeout > 0)
                .ok_or_else(|| {
                    CoreError::Config(format!(
                        "MARKETLENS_HTTP_TIMEOUT_MS must be a positive integer, got '{value}'"
                    ))
                })?;
        }

        Ok(config)
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }

    pub fn with_api_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    pub fn with_mode(mut self, mode: DataMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fixture_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixture_path = Some(path.into());
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!(
            "{name} must be a boolean, got '{value}'"
        ))),
    }
}

//! Configuration management for the Sage gateway

pub mod file;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::capabilities::Capabilities;
use crate::{Error, Result};

use self::file::SageConfigFile;

/// Default automation backend address
pub const DEFAULT_HOME_ASSISTANT_URL: &str = "http://homeassistant.local:8123";

/// Default per-call dispatch timeout
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sage gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Automation backend connection
    pub home_assistant: HomeAssistantConfig,

    /// Effective capability table and known-domain set
    pub capabilities: Arc<Capabilities>,
}

/// Automation backend connection settings
#[derive(Debug, Clone)]
pub struct HomeAssistantConfig {
    /// Base URL without trailing slash
    pub url: String,

    /// Bearer token
    pub token: SecretString,

    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HOME_ASSISTANT_URL.to_string(),
            token: SecretString::from(String::new()),
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting backend URL is invalid
    pub fn load() -> Result<Self> {
        // env > toml > default
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the resulting backend URL is invalid
    pub fn from_sources(
        fc: SageConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let url = env("HOME_ASSISTANT_URL")
            .or(fc.home_assistant.url)
            .unwrap_or_else(|| DEFAULT_HOME_ASSISTANT_URL.to_string());
        let url = validate_url(&url)?;

        let token = env("HOME_ASSISTANT_TOKEN")
            .or(fc.home_assistant.token)
            .unwrap_or_default();
        if token.is_empty() {
            tracing::warn!("no Home Assistant token configured, service calls will be rejected");
        }

        let timeout_secs = env("SAGE_DISPATCH_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.home_assistant.timeout_secs)
            .filter(|secs| *secs > 0);
        let timeout = timeout_secs.map_or(DEFAULT_DISPATCH_TIMEOUT, Duration::from_secs);

        let capabilities = Capabilities::builtin().with_overlay(
            fc.capabilities
                .services
                .iter()
                .map(|(domain, services)| (domain.as_str(), services.as_slice())),
            fc.capabilities.known_domains.iter().map(String::as_str),
        );

        Ok(Self {
            home_assistant: HomeAssistantConfig {
                url,
                token: SecretString::from(token),
                timeout,
            },
            capabilities: Arc::new(capabilities),
        })
    }
}

/// Check that a backend URL is an absolute http(s) URL and trim the trailing slash
fn validate_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Config(format!("invalid Home Assistant URL {raw:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Home Assistant URL must be http or https: {raw}"
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

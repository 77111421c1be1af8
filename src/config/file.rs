//! TOML configuration file loading
//!
//! Supports `~/.config/sage/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SageConfigFile {
    /// Automation backend connection
    #[serde(default)]
    pub home_assistant: HomeAssistantFileConfig,

    /// Additions to the built-in capability table
    #[serde(default)]
    pub capabilities: CapabilitiesFileConfig,
}

/// Automation backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct HomeAssistantFileConfig {
    /// Base URL (e.g. "http://homeassistant.local:8123")
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Capability overlay
#[derive(Debug, Default, Deserialize)]
pub struct CapabilitiesFileConfig {
    /// Extra domains recognized by the extractor but not dispatchable
    #[serde(default)]
    pub known_domains: Vec<String>,

    /// Extra allowed services per domain
    #[serde(default)]
    pub services: BTreeMap<String, Vec<String>>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<SageConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `SageConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SageConfigFile {
    config_file_path().map_or_else(SageConfigFile::default, |path| load_config_file_at(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing, unreadable and unparsable files all fall back to defaults.
pub fn load_config_file_at(path: &Path) -> SageConfigFile {
    if !path.exists() {
        return SageConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SageConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SageConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/sage/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sage").join("config.toml"))
}

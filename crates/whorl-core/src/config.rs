//! Configuration for Whorl.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/whorl/config.toml`
//! - macOS: `~/Library/Application Support/whorl/config.toml`
//! - Windows: `%APPDATA%\whorl\config.toml`
//!
//! Every key is optional. Environment variables override the file:
//! `WHORL_OWNER` sets the owner and `WHORL_INVENTORY_DIR` the inventory
//! root. When no owner is configured, `GITHUB_USER` and then `USER` are
//! consulted.
//!
//! ```toml
//! [general]
//! inventory_dir = "/srv/whorl"
//! owner = "ada"
//! default_format = "pretty"
//!
//! [runtime]
//! profile = "strict"
//! max_memory_mb = 32
//! timeout_seconds = 5
//! max_fuel = 1000000
//! max_host_calls = 100
//! ```
//!
//! # Examples
//!
//! ```
//! use whorl_core::WhorlConfig;
//!
//! let config = WhorlConfig::parse("[general]\nowner = \"ada\"\n").unwrap();
//! let owner = config.resolve_owner(|_| None).unwrap();
//! assert_eq!(owner.as_str(), "ada");
//! ```

use crate::{Error, OwnerId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the inventory owner.
pub const OWNER_ENV: &str = "WHORL_OWNER";

/// Environment variable naming the inventory root directory.
pub const INVENTORY_DIR_ENV: &str = "WHORL_INVENTORY_DIR";

const OWNER_FALLBACK_ENV: [&str; 2] = ["GITHUB_USER", "USER"];
const VALID_FORMATS: [&str; 3] = ["json", "text", "pretty"];
const VALID_PROFILES: [&str; 3] = ["strict", "moderate", "permissive"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhorlConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Sandbox settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Root directory of the local inventory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_dir: Option<PathBuf>,

    /// Inventory owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Default output format (json, text, pretty)
    #[serde(default = "default_format")]
    pub default_format: String,
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            inventory_dir: None,
            owner: None,
            default_format: default_format(),
        }
    }
}

/// Sandbox settings.
///
/// `profile` selects a baseline; any explicit limit overrides the
/// corresponding profile value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Security profile (strict, moderate, permissive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Maximum linear memory per item in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,

    /// Wall-clock deadline per call in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Fuel budget per call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fuel: Option<u64>,

    /// Maximum host function calls per call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_host_calls: Option<u32>,
}

impl WhorlConfig {
    /// Platform default location of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("whorl").join("config.toml"))
    }

    /// Parses configuration text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text is not valid TOML, has
    /// unknown keys, or fails [`Self::validate`].
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::ConfigError {
            message: format!("failed to parse config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields the
    /// default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (Self::default_path(), false),
        };

        let Some(path) = path else {
            debug!("no config directory available, using defaults");
            return Ok(Self::default());
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| Error::ConfigError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::parse(&text)
    }

    /// Applies environment overrides using `lookup` to read variables.
    #[must_use]
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(owner) = lookup(OWNER_ENV).filter(|v| !v.trim().is_empty()) {
            self.general.owner = Some(owner);
        }
        if let Some(dir) = lookup(INVENTORY_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.general.inventory_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Validates field values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid key.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::ConfigError { message });

        if !VALID_FORMATS.contains(&self.general.default_format.as_str()) {
            return fail(format!(
                "invalid general.default_format '{}', must be one of: {}",
                self.general.default_format,
                VALID_FORMATS.join(", ")
            ));
        }

        if let Some(profile) = &self.runtime.profile
            && !VALID_PROFILES.contains(&profile.as_str())
        {
            return fail(format!(
                "invalid runtime.profile '{profile}', must be one of: {}",
                VALID_PROFILES.join(", ")
            ));
        }

        if let Some(mb) = self.runtime.max_memory_mb
            && !(1..=4096).contains(&mb)
        {
            return fail("runtime.max_memory_mb must be between 1 and 4096".to_string());
        }

        if let Some(secs) = self.runtime.timeout_seconds
            && !(1..=600).contains(&secs)
        {
            return fail("runtime.timeout_seconds must be between 1 and 600".to_string());
        }

        if self.runtime.max_fuel == Some(0) {
            return fail("runtime.max_fuel must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolves the inventory owner.
    ///
    /// Uses the configured owner, then the fallback environment variables
    /// read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if no owner can be determined and
    /// [`Error::ValidationError`] if the owner is not a valid identifier.
    pub fn resolve_owner(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<OwnerId> {
        let owner = self
            .general
            .owner
            .clone()
            .or_else(|| {
                OWNER_FALLBACK_ENV
                    .into_iter()
                    .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
            })
            .ok_or_else(|| Error::ConfigError {
                message: format!(
                    "no owner configured; set general.owner or {OWNER_ENV}"
                ),
            })?;
        OwnerId::new(owner)
    }

    /// Resolves the inventory root directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if none is configured and the platform
    /// has no data directory.
    pub fn inventory_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.general.inventory_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("whorl").join("inventory"))
            .ok_or_else(|| Error::ConfigError {
                message: format!(
                    "cannot determine inventory directory; set general.inventory_dir or {INVENTORY_DIR_ENV}"
                ),
            })
    }
}

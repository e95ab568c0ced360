//! Sandbox limits for item execution.
//!
//! Every item runs with a memory ceiling, a fuel budget, a wall-clock
//! deadline and a cap on host calls. Items never get WASI, a filesystem or a
//! network.
//!
//! # Examples
//!
//! ```
//! use whorl_runtime::security::SecurityConfig;
//!
//! let config = SecurityConfig::default();
//! assert_eq!(config.memory_limit_bytes(), 64 * 1024 * 1024);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use whorl_core::{Error, MemoryLimit, Result, RuntimeConfig};

/// Predefined sandbox profiles.
///
/// # Examples
///
/// ```
/// use whorl_runtime::security::{SecurityConfig, SecurityProfile};
///
/// let strict = SecurityConfig::from_profile(SecurityProfile::Strict);
/// assert_eq!(strict.memory_limit_bytes(), 16 * 1024 * 1024);
///
/// let permissive = SecurityConfig::from_profile(SecurityProfile::Permissive);
/// assert_eq!(permissive.max_host_calls(), Some(10_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityProfile {
    /// 16MB, 5 seconds, 1M fuel, 100 host calls.
    Strict,

    /// 64MB, 10 seconds, 10M fuel, 1000 host calls.
    #[default]
    Moderate,

    /// 256MB, 30 seconds, 100M fuel, 10000 host calls.
    Permissive,
}

impl SecurityProfile {
    /// Returns the profile name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Permissive => "permissive",
        }
    }
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "moderate" => Ok(Self::Moderate),
            "permissive" => Ok(Self::Permissive),
            _ => Err(Error::ConfigError {
                message: format!(
                    "unknown security profile '{s}' (expected: strict, moderate, or permissive)"
                ),
            }),
        }
    }
}

/// Limits enforced on a sandboxed item.
///
/// # Examples
///
/// ```
/// use whorl_runtime::security::SecurityConfig;
/// use std::time::Duration;
///
/// let config = SecurityConfig::builder()
///     .memory_limit_mb(8)
///     .execution_timeout(Duration::from_secs(2))
///     .max_fuel(500_000)
///     .build();
///
/// assert_eq!(config.memory_limit_bytes(), 8 * 1024 * 1024);
/// assert_eq!(config.max_fuel(), Some(500_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    memory_limit: MemoryLimit,
    execution_timeout: Duration,
    max_fuel: Option<u64>,
    max_host_calls: Option<usize>,
}

impl SecurityConfig {
    /// Default memory limit: 64MB
    pub const DEFAULT_MEMORY_LIMIT_MB: usize = 64;

    /// Default execution timeout: 10 seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Default fuel budget: 10 million units
    pub const DEFAULT_FUEL: u64 = 10_000_000;

    /// Default host call limit
    pub const DEFAULT_MAX_HOST_CALLS: usize = 1000;

    /// Creates a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SecurityConfigBuilder {
        SecurityConfigBuilder::default()
    }

    /// Creates the configuration of a profile.
    #[must_use]
    pub fn from_profile(profile: SecurityProfile) -> Self {
        match profile {
            SecurityProfile::Strict => Self::strict(),
            SecurityProfile::Moderate => Self::moderate(),
            SecurityProfile::Permissive => Self::permissive(),
        }
    }

    /// Strict profile for unknown items.
    #[must_use]
    pub fn strict() -> Self {
        Self::builder()
            .memory_limit_mb(16)
            .execution_timeout(Duration::from_secs(5))
            .max_fuel(1_000_000)
            .max_host_calls(100)
            .build()
    }

    /// Moderate profile (the default).
    #[must_use]
    pub fn moderate() -> Self {
        Self::builder().build()
    }

    /// Permissive profile for trusted items.
    #[must_use]
    pub fn permissive() -> Self {
        Self::builder()
            .memory_limit_mb(256)
            .execution_timeout(Duration::from_secs(30))
            .max_fuel(100_000_000)
            .max_host_calls(10_000)
            .build()
    }

    /// Builds limits from the `[runtime]` configuration section.
    ///
    /// The named profile (default `moderate`) is the baseline; explicit
    /// values override it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an unknown profile name.
    ///
    /// # Examples
    ///
    /// ```
    /// use whorl_core::RuntimeConfig;
    /// use whorl_runtime::security::SecurityConfig;
    ///
    /// let runtime = RuntimeConfig {
    ///     profile: Some("strict".to_string()),
    ///     max_host_calls: Some(5),
    ///     ..Default::default()
    /// };
    /// let config = SecurityConfig::from_runtime_config(&runtime).unwrap();
    /// assert_eq!(config.memory_limit_bytes(), 16 * 1024 * 1024);
    /// assert_eq!(config.max_host_calls(), Some(5));
    /// ```
    pub fn from_runtime_config(runtime: &RuntimeConfig) -> Result<Self> {
        let profile = runtime
            .profile
            .as_deref()
            .map(str::parse::<SecurityProfile>)
            .transpose()?
            .unwrap_or_default();

        let mut config = Self::from_profile(profile);
        if let Some(mb) = runtime.max_memory_mb {
            config.memory_limit = MemoryLimit::from_mb(usize::try_from(mb).unwrap_or(usize::MAX));
        }
        if let Some(secs) = runtime.timeout_seconds {
            config.execution_timeout = Duration::from_secs(secs);
        }
        if let Some(fuel) = runtime.max_fuel {
            config.max_fuel = Some(fuel);
        }
        if let Some(calls) = runtime.max_host_calls {
            config.max_host_calls = Some(usize::try_from(calls).unwrap_or(usize::MAX));
        }
        Ok(config)
    }

    /// Memory limit in bytes.
    #[inline]
    #[must_use]
    pub const fn memory_limit_bytes(&self) -> usize {
        self.memory_limit.bytes()
    }

    /// Wall-clock deadline per guarded call.
    #[inline]
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    /// Fuel budget per guarded call; `None` disables fuel metering.
    #[inline]
    #[must_use]
    pub const fn max_fuel(&self) -> Option<u64> {
        self.max_fuel
    }

    /// Maximum number of host calls per materialization.
    #[inline]
    #[must_use]
    pub const fn max_host_calls(&self) -> Option<usize> {
        self.max_host_calls
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Builder for [`SecurityConfig`].
#[derive(Debug, Default)]
pub struct SecurityConfigBuilder {
    memory_limit_mb: Option<usize>,
    execution_timeout: Option<Duration>,
    max_fuel: Option<Option<u64>>,
    max_host_calls: Option<Option<usize>>,
}

impl SecurityConfigBuilder {
    /// Sets the memory limit in megabytes.
    #[must_use]
    pub const fn memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Sets the wall-clock deadline.
    #[must_use]
    pub const fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Sets the fuel budget.
    #[must_use]
    pub const fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(Some(fuel));
        self
    }

    /// Disables fuel metering.
    ///
    /// The wall-clock deadline still applies.
    #[must_use]
    pub const fn unlimited_fuel(mut self) -> Self {
        self.max_fuel = Some(None);
        self
    }

    /// Sets the host call limit.
    #[must_use]
    pub const fn max_host_calls(mut self, max: usize) -> Self {
        self.max_host_calls = Some(Some(max));
        self
    }

    /// Disables the host call limit.
    #[must_use]
    pub const fn unlimited_host_calls(mut self) -> Self {
        self.max_host_calls = Some(None);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SecurityConfig {
        SecurityConfig {
            memory_limit: MemoryLimit::from_mb(
                self.memory_limit_mb
                    .unwrap_or(SecurityConfig::DEFAULT_MEMORY_LIMIT_MB),
            ),
            execution_timeout: self
                .execution_timeout
                .unwrap_or_else(|| Duration::from_secs(SecurityConfig::DEFAULT_TIMEOUT_SECS)),
            max_fuel: self.max_fuel.unwrap_or(Some(SecurityConfig::DEFAULT_FUEL)),
            max_host_calls: self
                .max_host_calls
                .unwrap_or(Some(SecurityConfig::DEFAULT_MAX_HOST_CALLS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_moderate() {
        let config = SecurityConfig::default();
        assert_eq!(config, SecurityConfig::from_profile(SecurityProfile::Moderate));
        assert_eq!(config.execution_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_fuel(), Some(10_000_000));
        assert_eq!(config.max_host_calls(), Some(1000));
    }

    #[test]
    fn test_profiles_are_ordered() {
        let strict = SecurityConfig::strict();
        let moderate = SecurityConfig::moderate();
        let permissive = SecurityConfig::permissive();
        assert!(strict.memory_limit_bytes() < moderate.memory_limit_bytes());
        assert!(moderate.memory_limit_bytes() < permissive.memory_limit_bytes());
        assert!(strict.execution_timeout() < permissive.execution_timeout());
        assert!(strict.max_fuel() < permissive.max_fuel());
    }

    #[test]
    fn test_builder_unlimited() {
        let config = SecurityConfig::builder()
            .unlimited_fuel()
            .unlimited_host_calls()
            .build();
        assert_eq!(config.max_fuel(), None);
        assert_eq!(config.max_host_calls(), None);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!(
            "Strict".parse::<SecurityProfile>().unwrap(),
            SecurityProfile::Strict
        );
        assert!("lax".parse::<SecurityProfile>().unwrap_err().is_config_error());
    }

    #[test]
    fn test_from_runtime_config_defaults() {
        let config = SecurityConfig::from_runtime_config(&RuntimeConfig::default()).unwrap();
        assert_eq!(config, SecurityConfig::default());
    }

    #[test]
    fn test_from_runtime_config_overrides() {
        let runtime = RuntimeConfig {
            profile: Some("permissive".to_string()),
            max_memory_mb: Some(2),
            timeout_seconds: Some(1),
            max_fuel: Some(42),
            max_host_calls: None,
        };
        let config = SecurityConfig::from_runtime_config(&runtime).unwrap();
        assert_eq!(config.memory_limit_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.execution_timeout(), Duration::from_secs(1));
        assert_eq!(config.max_fuel(), Some(42));
        assert_eq!(config.max_host_calls(), Some(10_000));
    }
}

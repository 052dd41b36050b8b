//! Driver configuration handling.

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`DriverConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration directory not available.
    #[error("configuration directory not available")]
    ConfigDirUnavailable,
}

/// Tunables shared by every [`CacheDriver`](crate::CacheDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Seconds before `expires_on` at which a cached token already counts
    /// as expired.
    pub expiry_buffer_secs: i64,

    /// Whether a tenant-scoped driver may refresh from a multi-resource
    /// refresh token cached under the `common` authority.
    pub common_authority_fallback: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: 0,
            common_authority_fallback: true,
        }
    }
}

impl DriverConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn expiry_buffer(&self) -> Duration {
        Duration::try_seconds(self.expiry_buffer_secs.max(0)).unwrap_or(Duration::MAX)
    }
}

/// Load configuration from the default location or fall back to defaults.
pub fn load_config() -> Result<DriverConfig, ConfigError> {
    load_config_from_path(&default_config_path()?)
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load_config_from_path(path: &Path) -> Result<DriverConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(DriverConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = DriverConfig::from_toml_str(&contents)?;
    tracing::debug!("Loaded driver configuration from {:?}", path);
    Ok(config)
}

/// `cache.toml` in the platform configuration directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "adcache", "adcache")
        .ok_or(ConfigError::ConfigDirUnavailable)?;
    Ok(dirs.config_dir().join("cache.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.expiry_buffer_secs, 0);
        assert!(config.common_authority_fallback);
        assert_eq!(config.expiry_buffer(), Duration::zero());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = DriverConfig::from_toml_str("expiry_buffer_secs = 300").unwrap();
        assert_eq!(config.expiry_buffer(), Duration::minutes(5));
        assert!(config.common_authority_fallback);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let result = DriverConfig::from_toml_str("expiry_buffer_secs = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_negative_buffer_clamps_to_zero() {
        let config = DriverConfig {
            expiry_buffer_secs: -30,
            ..DriverConfig::default()
        };
        assert_eq!(config.expiry_buffer(), Duration::zero());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "expiry_buffer_secs = 60").unwrap();
        writeln!(file, "common_authority_fallback = false").unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.expiry_buffer_secs, 60);
        assert!(!config.common_authority_fallback);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DriverConfig::default());
    }
}

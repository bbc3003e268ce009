//! Application configuration management.
//!
//! Handles loading and validating fencetag configuration:
//! - Tag expiry delay and cancellation policy
//! - Location service credentials (passed through untouched)
//! - Data directory for the persisted tag set
//! - HTTP server settings
//!
//! Configuration lives in a TOML file. [`FencetagConfig::load_layered`]
//! reads it and then lets `FENCETAG__SECTION__KEY` environment variables
//! override individual values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::SdkCredentials;
use crate::router::DEFAULT_TAG_EXPIRY;
use crate::scheduler::ExpiryPolicy;

/// Longest accepted tag expiry (one day).
pub const MAX_TAG_EXPIRY_MS: u64 = 86_400_000;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FENCETAG";

/// Errors that can occur while handling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Merging file and environment sources failed.
    #[error("Failed to assemble configuration: {0}")]
    LayeredError(#[from] config::ConfigError),

    /// A single field is invalid.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FencetagConfig {
    /// Deferred tag removal settings.
    pub expiry: ExpiryConfig,

    /// Location service credentials. The service is not started without them.
    pub credentials: Option<SdkCredentials>,

    /// Tag persistence settings.
    pub storage: StorageConfig,

    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Deferred tag removal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Milliseconds a self-expiring tag stays applied.
    pub delay_ms: u64,

    /// What happens to a pending removal when the same fence or beacon
    /// sees another event.
    pub policy: ExpiryPolicy,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            delay_ms: u64::try_from(DEFAULT_TAG_EXPIRY.as_millis()).unwrap_or(7000),
            policy: ExpiryPolicy::default(),
        }
    }
}

impl ExpiryConfig {
    /// Expiry delay as a [`Duration`].
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Tag persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for `tags.json`. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,

    /// Production logging (JSON files plus compact stdout).
    pub production: bool,

    /// Start the location service on boot when credentials are configured.
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
            auto_start: true,
        }
    }
}

impl FencetagConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparsable or invalid.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::from_file(path) {
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Load configuration from an optional TOML file overlaid with
    /// `FENCETAG__*` environment variables (e.g. `FENCETAG__EXPIRY__DELAY_MS`).
    ///
    /// The file, when present, must be valid on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is invalid, the sources cannot be merged
    /// or the merged result is invalid.
    pub fn load_layered(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::layered(path.as_ref(), ENV_PREFIX)
    }

    fn layered(path: &Path, prefix: &str) -> ConfigResult<Self> {
        let file = Self::load_or_default(path)?;
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&file)?)
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or, when several
    /// fields are wrong, [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.expiry.delay_ms == 0 || self.expiry.delay_ms > MAX_TAG_EXPIRY_MS {
            errors.push(ConfigError::ValidationError {
                field: "expiry.delay_ms".into(),
                message: format!(
                    "must be between 1 and {MAX_TAG_EXPIRY_MS} (got {})",
                    self.expiry.delay_ms
                ),
            });
        }

        if let Some(credentials) = &self.credentials {
            for (field, message) in credentials.problems() {
                errors.push(ConfigError::ValidationError {
                    field: format!("credentials.{field}"),
                    message,
                });
            }
        }

        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ConfigError::ValidationError {
                field: "server.bind_address".into(),
                message: format!("'{}' is not a socket address", self.server.bind_address),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file path.
///
/// On Linux: `/etc/fencetag/config.toml`.
/// Elsewhere: the platform config directory for `fencetag`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/fencetag/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fencetag").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[expiry]
delay_ms = 5000
policy = "fire_always"

[credentials]
package_name = "au.com.example.app"
api_key = "2b0c2c4e-5f0e-11e6-8b77-86f30ca893d3"
user_name = "ops@example.com"
restart_mode = true

[storage]
data_dir = "/tmp/fencetag"

[server]
bind_address = "127.0.0.1:8080"
production = true
"#;

    #[test]
    fn test_defaults() {
        let config = FencetagConfig::default();
        assert_eq!(config.expiry.delay_ms, 7000);
        assert_eq!(config.expiry.delay(), Duration::from_millis(7000));
        assert_eq!(config.expiry.policy, ExpiryPolicy::CancelOnReentry);
        assert!(config.credentials.is_none());
        assert!(config.server.auto_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FencetagConfig::from_file(&path).unwrap();
        assert_eq!(config.expiry.delay_ms, 5000);
        assert_eq!(config.expiry.policy, ExpiryPolicy::FireAlways);
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.package_name, "au.com.example.app");
        assert!(credentials.restart_mode);
        assert!(credentials.endpoint_url.is_none());
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/fencetag")));
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert!(config.server.production);
        assert!(config.server.auto_start);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[expiry]\ndelay_ms = 1500\n").unwrap();

        let config = FencetagConfig::from_file(&path).unwrap();
        assert_eq!(config.expiry.delay_ms, 1500);
        assert_eq!(config.expiry.policy, ExpiryPolicy::CancelOnReentry);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FencetagConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FencetagConfig::default());
    }

    #[test]
    fn test_from_file_missing_is_not_found() {
        let result = FencetagConfig::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[expiry\ndelay_ms = ").unwrap();
        assert!(matches!(
            FencetagConfig::from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_delay() {
        let mut config = FencetagConfig::default();
        config.expiry.delay_ms = 0;
        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "expiry.delay_ms"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = FencetagConfig::default();
        config.expiry.delay_ms = MAX_TAG_EXPIRY_MS + 1;
        config.server.bind_address = "nowhere".into();
        config.credentials = Some(SdkCredentials {
            package_name: "au.com.example.app".into(),
            api_key: "not-a-uuid".into(),
            user_name: "ops".into(),
            endpoint_url: None,
            restart_mode: false,
        });

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                assert_eq!(errors.len(), 3);
                let text: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert!(text.iter().any(|e| e.contains("credentials.api_key")));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_load_layered_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FencetagConfig::load_layered(&path).unwrap();
        assert_eq!(config.expiry.delay_ms, 5000);
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
    }

    #[test]
    fn test_load_layered_env_overrides_file() {
        const PREFIX: &str = "FENCETAG_LAYERED_TEST";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        std::env::set_var("FENCETAG_LAYERED_TEST__EXPIRY__DELAY_MS", "2500");
        std::env::set_var("FENCETAG_LAYERED_TEST__SERVER__AUTO_START", "false");
        let config = FencetagConfig::layered(&path, PREFIX);
        std::env::remove_var("FENCETAG_LAYERED_TEST__EXPIRY__DELAY_MS");
        std::env::remove_var("FENCETAG_LAYERED_TEST__SERVER__AUTO_START");

        let config = config.unwrap();
        assert_eq!(config.expiry.delay_ms, 2500);
        assert_eq!(config.expiry.policy, ExpiryPolicy::FireAlways);
        assert!(!config.server.auto_start);
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(
            config.credentials.map(|c| c.user_name),
            Some("ops@example.com".to_string())
        );
    }

    #[test]
    fn test_load_layered_rejects_invalid_env_value() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FENCETAG_LAYERED_ZERO__EXPIRY__DELAY_MS", "0");
        let result = FencetagConfig::layered(&dir.path().join("absent.toml"), "FENCETAG_LAYERED_ZERO");
        std::env::remove_var("FENCETAG_LAYERED_ZERO__EXPIRY__DELAY_MS");

        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_load_layered_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FencetagConfig::load_layered(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.expiry.delay_ms, 7000);
    }
}

//! Unified error types for the fencetag core library.
//!
//! [`FencetagError`] covers every failure mode the adapter can surface.
//! Modules keep their own specific error types ([`ConfigError`],
//! [`StoreError`], [`LocationError`]) and convert into this one at the
//! crate boundary.
//!
//! # Example
//!
//! ```rust
//! use fencetag_core::error::{FencetagError, Result};
//! use std::path::PathBuf;
//!
//! fn load_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(FencetagError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`StoreError`]: crate::store::StoreError
//! [`LocationError`]: crate::location::LocationError

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all fencetag operations.
#[derive(Debug, Error)]
pub enum FencetagError {
    // =========================================================================
    // TAG STORE ERRORS
    // =========================================================================
    /// The tag store rejected or could not apply a mutation.
    #[error("Tag store unavailable: {0}")]
    TagStoreUnavailable(String),

    /// The expiry dispatcher is no longer running.
    #[error("Tag expiry scheduler is not running")]
    SchedulerUnavailable,

    // =========================================================================
    // LOCATION SERVICE ERRORS
    // =========================================================================
    /// The location backend rejected the credentials.
    #[error("Location service authentication failed: {0}")]
    LocationAuthenticationFailed(String),

    /// The location service reported an error.
    #[error("Location service error: {message}")]
    LocationServiceFailed {
        /// Description of the failure.
        message: String,
        /// Whether the service stopped because of it.
        fatal: bool,
    },

    /// An operation needed the location service to be running.
    #[error("Location service is not running. Start it with valid credentials first.")]
    LocationServiceNotRunning,

    /// No credentials were supplied or configured.
    #[error("No location service credentials configured")]
    CredentialsMissing,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for fencetag operations.
pub type Result<T> = std::result::Result<T, FencetagError>;

impl FencetagError {
    /// Returns `true` if this error came from the tag store or expiry scheduler.
    #[inline]
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::TagStoreUnavailable(_) | Self::SchedulerUnavailable)
    }

    /// Returns `true` if this error came from the location service boundary.
    #[inline]
    #[must_use]
    pub const fn is_location_error(&self) -> bool {
        matches!(
            self,
            Self::LocationAuthenticationFailed(_)
                | Self::LocationServiceFailed { .. }
                | Self::LocationServiceNotRunning
                | Self::CredentialsMissing
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::TagStoreUnavailable(_) | Self::LocationServiceNotRunning => true,
            Self::LocationServiceFailed { fatal, .. } => !*fatal,
            _ => false,
        }
    }

    /// Returns an HTTP-appropriate status code for this error.
    ///
    /// The server renders every core error with this status.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 401 Unauthorized - credentials rejected upstream
            Self::LocationAuthenticationFailed(_) => 401,

            // 409 Conflict - wrong lifecycle state
            Self::LocationServiceNotRunning => 409,

            // 424 Failed Dependency - nothing to start the service with
            Self::CredentialsMissing => 424,

            // 500 Internal Server Error - server-side configuration or disk
            Self::ConfigNotFound(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_)
            | Self::PersistenceError(_)
            | Self::IoError(_) => 500,

            // 503 Service Unavailable - collaborators down
            Self::TagStoreUnavailable(_)
            | Self::SchedulerUnavailable
            | Self::LocationServiceFailed { .. } => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TagStoreUnavailable(_) => "TAG_STORE_UNAVAILABLE",
            Self::SchedulerUnavailable => "SCHEDULER_UNAVAILABLE",
            Self::LocationAuthenticationFailed(_) => "LOCATION_AUTHENTICATION_FAILED",
            Self::LocationServiceFailed { .. } => "LOCATION_SERVICE_FAILED",
            Self::LocationServiceNotRunning => "LOCATION_SERVICE_NOT_RUNNING",
            Self::CredentialsMissing => "CREDENTIALS_MISSING",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for FencetagError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::LayeredError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::store::StoreError> for FencetagError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::Unavailable { message } => Self::TagStoreUnavailable(message),
            StoreError::LockPoisoned => Self::TagStoreUnavailable(err.to_string()),
            StoreError::ReadError { .. }
            | StoreError::WriteError { .. }
            | StoreError::ParseError { .. }
            | StoreError::SerializeError(_)
            | StoreError::CreateDirError { .. } => Self::PersistenceError(err.to_string()),
        }
    }
}

impl From<crate::location::LocationError> for FencetagError {
    fn from(err: crate::location::LocationError) -> Self {
        use crate::location::LocationError;
        match err {
            LocationError::Authentication { reason } => Self::LocationAuthenticationFailed(reason),
            other => Self::LocationServiceFailed {
                fatal: other.is_fatal(),
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

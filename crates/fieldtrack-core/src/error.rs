//! Unified error types for the fieldtrack core library.
//!
//! [`FieldtrackError`] covers every failure mode of the location provider,
//! the proximity monitor and configuration loading. Position sources report
//! their own normalized [`SourceError`](crate::source::SourceError), which is
//! converted at the provider boundary.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Permission errors say what is needed and why
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use fieldtrack_core::error::{FieldtrackError, Result};
//! use fieldtrack_core::PermissionStatus;
//!
//! fn require_location(status: PermissionStatus) -> Result<()> {
//!     if !status.is_granted() {
//!         return Err(FieldtrackError::PermissionDenied { permanent: false });
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Why location access is requested, suitable for a permission prompt.
pub const PERMISSION_RATIONALE: &str = "Location access lets fieldtrack detect when you arrive at \
    or leave a work order, asset or location, so check-ins happen automatically.";

/// The unified error type for all fieldtrack operations.
#[derive(Debug, Error)]
pub enum FieldtrackError {
    // =========================================================================
    // PERMISSION ERRORS
    // =========================================================================
    /// The user declined location access.
    #[error(
        "Location permission denied. Fieldtrack needs location access to detect when you \
         arrive at or leave work orders, assets and locations. {}",
        denial_hint(.permanent)
    )]
    PermissionDenied {
        /// The user asked not to be prompted again.
        permanent: bool,
    },

    /// Location access is blocked by device policy.
    #[error(
        "Location access is restricted on this device. Fieldtrack needs location access to \
         detect arrival at work sites; ask your device administrator to allow it."
    )]
    PermissionRestricted,

    // =========================================================================
    // POSITION ERRORS
    // =========================================================================
    /// The platform could not determine a position.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix arrived within the configured timeout.
    #[error("Timed out waiting for a location fix: {0}")]
    Timeout(String),

    /// The fix is too imprecise to be trusted.
    #[error(
        "Location accuracy too low: {accuracy_meters:.1} m exceeds the {threshold_meters:.1} m \
         threshold. Move to an open area and try again."
    )]
    AccuracyTooLow {
        /// Reported accuracy radius.
        accuracy_meters: f64,
        /// Configured maximum accepted accuracy radius.
        threshold_meters: f64,
    },

    /// Continuous tracking was started twice without a stop in between.
    #[error("Location tracking is already running. Stop it before starting again.")]
    AlreadyTracking,

    /// The fix itself is malformed (coordinates out of range, negative accuracy).
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Any other platform failure.
    #[error("Location error: {0}")]
    Unknown(String),

    // =========================================================================
    // TARGET ERRORS
    // =========================================================================
    /// No target with this id is registered.
    #[error("Target not found: '{0}'")]
    TargetNotFound(String),

    /// The target definition is invalid.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn denial_hint(permanent: &bool) -> &'static str {
    if *permanent {
        "Location access was permanently denied; enable it for this app in the device settings."
    } else {
        "Allow location access when prompted, then try again."
    }
}

/// A specialized [`Result`] type for fieldtrack operations.
pub type Result<T> = std::result::Result<T, FieldtrackError>;

impl FieldtrackError {
    /// Returns `true` if this error is a permission failure.
    #[inline]
    #[must_use]
    pub const fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::PermissionRestricted)
    }

    /// Returns `true` if this error concerns obtaining or validating a fix.
    #[inline]
    #[must_use]
    pub const fn is_position_error(&self) -> bool {
        matches!(
            self,
            Self::PositionUnavailable(_)
                | Self::Timeout(_)
                | Self::AccuracyTooLow { .. }
                | Self::InvalidPosition(_)
                | Self::Unknown(_)
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

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PositionUnavailable(_) | Self::Timeout(_) | Self::AccuracyTooLow { .. }
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidTarget(_) | Self::InvalidPosition(_) => 400,

            // 403 Forbidden - location access refused
            Self::PermissionDenied { .. } | Self::PermissionRestricted => 403,

            // 404 Not Found
            Self::TargetNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict - current state forbids the operation
            Self::AlreadyTracking => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::AccuracyTooLow { .. }
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error
            Self::IoError(_) | Self::Unknown(_) => 500,

            // 503 Service Unavailable - the position source cannot answer
            Self::PositionUnavailable(_) => 503,

            // 504 Gateway Timeout
            Self::Timeout(_) => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::PermissionRestricted => "PERMISSION_RESTRICTED",
            Self::PositionUnavailable(_) => "POSITION_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::AccuracyTooLow { .. } => "ACCURACY_TOO_LOW",
            Self::AlreadyTracking => "ALREADY_TRACKING",
            Self::InvalidPosition(_) => "INVALID_POSITION",
            Self::Unknown(_) => "UNKNOWN",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::source::SourceError> for FieldtrackError {
    fn from(err: crate::source::SourceError) -> Self {
        use crate::source::SourceErrorKind;
        match err.kind {
            SourceErrorKind::PermissionDenied => Self::PermissionDenied { permanent: false },
            SourceErrorKind::PositionUnavailable => Self::PositionUnavailable(err.message),
            SourceErrorKind::Timeout => Self::Timeout(err.message),
            SourceErrorKind::Unknown => Self::Unknown(err.message),
        }
    }
}

impl From<crate::config::ConfigError> for FieldtrackError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

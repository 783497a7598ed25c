//! Application configuration management.
//!
//! Handles loading and validating fieldtrack configuration:
//! - Monitoring parameters (accuracy threshold, check interval, default radius, timeouts)
//! - Which position source to use (host-fed or gpsd)
//! - HTTP server settings
//!
//! Configuration is layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `FIELDTRACK__`-prefixed environment variables
//! (for example `FIELDTRACK__MONITOR__CHECK_INTERVAL_SECS=5`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FIELDTRACK_CONFIG";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FIELDTRACK";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
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

// ============================================================================
// Monitor configuration
// ============================================================================

/// Tunable parameters of the location provider and proximity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
#[schema(example = json!({
    "accuracy_threshold_meters": 50.0,
    "distance_filter_meters": 10.0,
    "check_interval_secs": 10,
    "default_radius_meters": 100.0,
    "timeout_ms": 15000,
    "max_age_ms": 10000,
    "enable_high_accuracy": true
}))]
pub struct MonitorConfig {
    /// Fixes with a larger accuracy radius are rejected.
    pub accuracy_threshold_meters: f64,

    /// Minimum movement before a streamed fix is forwarded.
    pub distance_filter_meters: f64,

    /// Period of the re-evaluation timer.
    pub check_interval_secs: u64,

    /// Radius given to targets added without one.
    pub default_radius_meters: f64,

    /// How long a one-shot fix request may take.
    pub timeout_ms: u64,

    /// Oldest cached fix a one-shot request may reuse.
    pub max_age_ms: u64,

    /// Ask the platform for its most precise mode.
    pub enable_high_accuracy: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_meters: 50.0,
            distance_filter_meters: 10.0,
            check_interval_secs: 10,
            default_radius_meters: 100.0,
            timeout_ms: 15_000,
            max_age_ms: 10_000,
            enable_high_accuracy: true,
        }
    }
}

impl MonitorConfig {
    /// Apply a partial update. Fields left as `None` keep their value.
    #[must_use]
    pub fn merged(mut self, update: &ConfigUpdate) -> Self {
        if let Some(v) = update.accuracy_threshold_meters {
            self.accuracy_threshold_meters = v;
        }
        if let Some(v) = update.distance_filter_meters {
            self.distance_filter_meters = v;
        }
        if let Some(v) = update.check_interval_secs {
            self.check_interval_secs = v;
        }
        if let Some(v) = update.default_radius_meters {
            self.default_radius_meters = v;
        }
        if let Some(v) = update.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = update.max_age_ms {
            self.max_age_ms = v;
        }
        if let Some(v) = update.enable_high_accuracy {
            self.enable_high_accuracy = v;
        }
        self
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for one bad field, or
    /// [`ConfigError::MultipleValidationErrors`] when several are bad.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !positive(self.accuracy_threshold_meters) {
            errors.push(invalid(
                "monitor.accuracy_threshold_meters",
                "must be greater than 0",
            ));
        }
        if !self.distance_filter_meters.is_finite() || self.distance_filter_meters < 0.0 {
            errors.push(invalid(
                "monitor.distance_filter_meters",
                "must be 0 or greater",
            ));
        }
        if self.check_interval_secs == 0 {
            errors.push(invalid(
                "monitor.check_interval_secs",
                "must be at least 1 second",
            ));
        }
        if !positive(self.default_radius_meters) {
            errors.push(invalid(
                "monitor.default_radius_meters",
                "must be greater than 0",
            ));
        }
        if self.timeout_ms == 0 {
            errors.push(invalid("monitor.timeout_ms", "must be greater than 0"));
        }

        collect(errors)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn collect(mut errors: Vec<ConfigError>) -> ConfigResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ConfigError::MultipleValidationErrors(errors)),
    }
}

/// A partial update of [`MonitorConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "timeout_ms": 25000 }))]
pub struct ConfigUpdate {
    /// New accuracy threshold in meters.
    pub accuracy_threshold_meters: Option<f64>,
    /// New distance filter in meters.
    pub distance_filter_meters: Option<f64>,
    /// New check interval in seconds.
    pub check_interval_secs: Option<u64>,
    /// New default target radius in meters.
    pub default_radius_meters: Option<f64>,
    /// New one-shot timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// New cached-fix maximum age in milliseconds.
    pub max_age_ms: Option<u64>,
    /// New high-accuracy preference.
    pub enable_high_accuracy: Option<bool>,
}

// ============================================================================
// Application configuration
// ============================================================================

/// Which platform supplies fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Fixes and the permission signal are pushed by the host.
    Manual,
    /// Fixes are read from a gpsd daemon.
    Gpsd,
}

/// Position source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source implementation.
    pub kind: SourceKind,

    /// gpsd host name.
    pub gpsd_host: String,

    /// gpsd TCP port.
    pub gpsd_port: u16,

    /// Accuracy reported for gpsd fixes that carry no error estimate.
    pub assumed_accuracy_meters: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Manual,
            gpsd_host: "127.0.0.1".to_string(),
            gpsd_port: 2947,
            assumed_accuracy_meters: 25.0,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind_address: String,

    /// Use production logging (JSON files + compact stdout).
    pub production: bool,

    /// Start monitoring as soon as the server is up.
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
            auto_start: false,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Monitoring parameters.
    pub monitor: MonitorConfig,

    /// Position source settings.
    pub source: SourceConfig,
}

impl AppConfig {
    /// Load from the default location (or `FIELDTRACK_CONFIG`) plus environment
    /// overrides. A missing default file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if `FIELDTRACK_CONFIG` names a missing file, if the
    /// sources cannot be parsed, or if validation fails.
    pub fn load() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Self::build(default_config_path().as_deref(), false),
        }
    }

    /// Load from an explicit file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, or a
    /// parse/validation error.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::build(Some(path), true)
    }

    fn build(path: Option<&Path>, required: bool) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(required));
        }
        let merged = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = merged.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of all sections.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = match self.monitor.validate() {
            Ok(()) => Vec::new(),
            Err(ConfigError::MultipleValidationErrors(errors)) => errors,
            Err(e) => vec![e],
        };

        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(invalid(
                "server.bind_address",
                "must be a socket address such as 0.0.0.0:3000",
            ));
        }
        if self.source.kind == SourceKind::Gpsd && self.source.gpsd_host.trim().is_empty() {
            errors.push(invalid("source.gpsd_host", "cannot be empty"));
        }
        if !positive(self.source.assumed_accuracy_meters) {
            errors.push(invalid(
                "source.assumed_accuracy_meters",
                "must be greater than 0",
            ));
        }

        collect(errors)
    }
}

/// Default configuration file path for the current platform.
///
/// On Linux: `/etc/fieldtrack/config.toml`.
/// Elsewhere: the platform config directory, e.g. `~/Library/Application Support/fieldtrack/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/fieldtrack/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fieldtrack")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

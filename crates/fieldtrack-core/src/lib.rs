//! # fieldtrack-core
//!
//! Core engine for fieldtrack: device location tracking and geofence
//! proximity monitoring for field technicians.
//!
//! This crate provides:
//! - Location permission handling, one-shot fixes and continuous tracking
//!   with accuracy and distance filtering
//! - A proximity monitor that emits `enter`/`exit` events when the device
//!   crosses the boundary of a registered circular target
//! - Pluggable position sources (host-driven, gpsd)
//! - Configuration management and a unified error taxonomy
//!
//! ## Architecture
//!
//! - [`geo`] - Great-circle distance and coordinate validation
//! - [`source`] - The [`PositionSource`] seam and the host-driven source
//! - [`location`] - [`LocationProvider`]: permission, accuracy and distance policy
//! - [`monitor`] - [`ProximityMonitor`]: target registry and enter/exit detection
//! - [`config`] - Application configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldtrack_core::{
//!     ManualPositionSource, MonitorConfig, PermissionStatus, ProximityMonitor,
//!     ProximityTarget, TargetType,
//! };
//!
//! # async fn run() -> fieldtrack_core::Result<()> {
//! let source = Arc::new(ManualPositionSource::new(PermissionStatus::Granted));
//! let monitor = ProximityMonitor::new(source, MonitorConfig::default());
//!
//! monitor.add_target(ProximityTarget::new(
//!     "wo-1042", "Replace pump seal", 40.7128, -74.0060, 150.0, TargetType::WorkOrder,
//! ))?;
//! monitor.add_event_handler(|event| {
//!     println!("{} {}", event.kind, event.target_name);
//!     Ok(())
//! });
//! monitor.start_monitoring().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod geo;
#[cfg(feature = "gpsd")]
pub mod gpsd;
pub mod location;
pub mod monitor;
pub mod source;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    default_config_path, AppConfig, ConfigError, ConfigResult, ConfigUpdate, MonitorConfig,
    ServerConfig, SourceConfig, SourceKind,
};
pub use error::{FieldtrackError, Result, PERMISSION_RATIONALE};
pub use geo::{distance_meters, Coordinates, CoordinateError};
#[cfg(feature = "gpsd")]
pub use gpsd::GpsdSource;
pub use location::{LocationProvider, TrackingHandle};
pub use monitor::{EventHandler, HandlerId, ProximityMonitor};
pub use source::{
    ManualPositionSource, PositionRequest, PositionSource, PositionStream, SourceError,
    SourceErrorKind, SourceResult,
};
pub use types::{
    PermissionStatus, Position, ProximityCheck, ProximityEvent, ProximityEventKind,
    ProximityTarget, TargetType,
};

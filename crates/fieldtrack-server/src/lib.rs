//! # fieldtrack-server
//!
//! HTTP server library for fieldtrack location and geofence monitoring.
//!
//! This library provides the API handlers, application state and logging
//! setup used by the `fieldtrack-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

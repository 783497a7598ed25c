//! Location provider: permissions, one-shot fixes and continuous tracking.
//!
//! The provider wraps a [`PositionSource`] and adds the policy the rest of
//! the engine relies on:
//! - permission failures are surfaced, never retried
//! - one-shot fixes less accurate than the configured threshold are errors
//! - streamed fixes less accurate than the threshold are logged and dropped,
//!   so one noisy sample cannot trigger a false enter/exit
//! - streamed platform errors go to the caller's error callback and tracking
//!   keeps running

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::MonitorConfig;
use crate::error::{FieldtrackError, Result};
use crate::geo::{self, Coordinates};
use crate::source::{PositionRequest, PositionSource, PositionStream, SourceError};
use crate::types::{PermissionStatus, Position};

/// Configuration shared between a monitor and its provider.
pub type SharedConfig = Arc<RwLock<MonitorConfig>>;

/// Identifies one tracking session returned by [`LocationProvider::start_tracking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingHandle(u64);

struct ActiveTracking {
    handle: TrackingHandle,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ActiveTracking {
    fn cancel(self) {
        self.active.store(false, Ordering::Release);
        self.task.abort();
    }
}

/// Produces validated positions from a platform source.
pub struct LocationProvider {
    source: Arc<dyn PositionSource>,
    config: SharedConfig,
    tracking: Mutex<Option<ActiveTracking>>,
    next_handle: AtomicU64,
}

impl LocationProvider {
    /// Create a provider with its own configuration.
    #[must_use]
    pub fn new(source: Arc<dyn PositionSource>, config: MonitorConfig) -> Self {
        Self::with_shared_config(source, Arc::new(RwLock::new(config)))
    }

    /// Create a provider reading configuration that someone else updates.
    #[must_use]
    pub fn with_shared_config(source: Arc<dyn PositionSource>, config: SharedConfig) -> Self {
        Self {
            source,
            config,
            tracking: Mutex::new(None),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> MonitorConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// Ask the platform for location permission. Never fails: a platform
    /// error is logged and reported as [`PermissionStatus::Denied`].
    pub async fn request_permission(&self) -> PermissionStatus {
        match self.source.request_permission().await {
            Ok(status) => {
                info!(%status, "Location permission requested");
                status
            }
            Err(e) => {
                warn!(error = %e, "Permission request failed, treating as denied");
                PermissionStatus::Denied
            }
        }
    }

    /// Current permission status, without prompting.
    pub async fn check_permission(&self) -> PermissionStatus {
        self.source.check_permission().await.unwrap_or_else(|e| {
            warn!(error = %e, "Permission check failed, treating as denied");
            PermissionStatus::Denied
        })
    }

    async fn ensure_permission(&self) -> Result<()> {
        let status = self.check_permission().await;
        if !status.is_granted() {
            warn!(%status, "Location permission not granted");
        }
        status.ensure_granted()
    }

    // ========================================================================
    // One-shot
    // ========================================================================

    /// Take a single fix.
    ///
    /// # Errors
    ///
    /// - [`FieldtrackError::PermissionDenied`] / [`FieldtrackError::PermissionRestricted`]
    ///   if permission is not granted
    /// - [`FieldtrackError::Timeout`] if no fix arrives within `timeout_ms`
    /// - [`FieldtrackError::PositionUnavailable`] / [`FieldtrackError::Unknown`]
    ///   for other platform failures
    /// - [`FieldtrackError::AccuracyTooLow`] if the fix exceeds the accuracy threshold
    pub async fn get_current_position(&self) -> Result<Position> {
        self.ensure_permission().await?;

        let config = self.config();
        let request = PositionRequest::from(&config);
        let position = tokio::time::timeout(request.timeout, self.source.current_position(&request))
            .await
            .map_err(|_| SourceError::timed_out(request.timeout))??;

        if position.accuracy_meters > config.accuracy_threshold_meters {
            return Err(FieldtrackError::AccuracyTooLow {
                accuracy_meters: position.accuracy_meters,
                threshold_meters: config.accuracy_threshold_meters,
            });
        }

        debug!(
            latitude = position.latitude,
            longitude = position.longitude,
            accuracy = position.accuracy_meters,
            "Current position acquired"
        );
        Ok(position)
    }

    // ========================================================================
    // Continuous tracking
    // ========================================================================

    /// Start continuous tracking.
    ///
    /// Accepted fixes are passed to `on_update` in arrival order; platform
    /// stream errors are passed to `on_error` and tracking continues.
    ///
    /// # Errors
    ///
    /// - permission errors as for [`Self::get_current_position`]
    /// - [`FieldtrackError::AlreadyTracking`] if a session is already running
    /// - platform errors raised while subscribing
    pub async fn start_tracking<U, E>(&self, on_update: U, on_error: E) -> Result<TrackingHandle>
    where
        U: Fn(Position) + Send + Sync + 'static,
        E: Fn(FieldtrackError) + Send + Sync + 'static,
    {
        if self.is_tracking() {
            warn!("start_tracking called while already tracking");
            return Err(FieldtrackError::AlreadyTracking);
        }
        self.ensure_permission().await?;

        let request = PositionRequest::from(&self.config());
        let stream = self.source.watch_position(&request).await?;

        let mut tracking = self.tracking.lock().unwrap_or_else(PoisonError::into_inner);
        if tracking.is_some() {
            // Lost a race with a concurrent start; dropping the stream unsubscribes.
            return Err(FieldtrackError::AlreadyTracking);
        }

        let handle = TrackingHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(forward_stream(
            stream,
            Arc::clone(&self.config),
            Arc::clone(&active),
            on_update,
            on_error,
        ));

        *tracking = Some(ActiveTracking {
            handle,
            active,
            task,
        });
        info!(handle = handle.0, "Location tracking started");
        Ok(handle)
    }

    /// Stop a tracking session. Idempotent; stale handles are ignored.
    ///
    /// No callback of this session starts after this returns.
    pub fn stop_tracking(&self, handle: TrackingHandle) {
        let mut tracking = self.tracking.lock().unwrap_or_else(PoisonError::into_inner);
        match tracking.take() {
            Some(current) if current.handle == handle => {
                current.cancel();
                info!(handle = handle.0, "Location tracking stopped");
            }
            other => {
                *tracking = other;
                debug!(handle = handle.0, "stop_tracking for inactive handle ignored");
            }
        }
    }

    /// Whether a tracking session is running.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Great-circle distance between two points in meters.
    #[must_use]
    pub fn distance_meters(a: Coordinates, b: Coordinates) -> f64 {
        geo::distance_meters(a, b)
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        let tracking = self
            .tracking
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tracking) = tracking {
            tracking.cancel();
        }
    }
}

/// Pump one subscription until it ends or is cancelled.
async fn forward_stream<U, E>(
    mut stream: PositionStream,
    config: SharedConfig,
    active: Arc<AtomicBool>,
    on_update: U,
    on_error: E,
) where
    U: Fn(Position) + Send + Sync + 'static,
    E: Fn(FieldtrackError) + Send + Sync + 'static,
{
    let mut last_forwarded: Option<Coordinates> = None;

    while let Some(item) = stream.recv().await {
        if !active.load(Ordering::Acquire) {
            break;
        }

        let position = match item {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "Location stream error");
                on_error(e.into());
                continue;
            }
        };

        let config = *config.read().unwrap_or_else(PoisonError::into_inner);
        if position.accuracy_meters > config.accuracy_threshold_meters {
            warn!(
                accuracy = position.accuracy_meters,
                threshold = config.accuracy_threshold_meters,
                "Dropping low-accuracy fix"
            );
            continue;
        }

        if let Some(previous) = last_forwarded {
            let moved = geo::distance_meters(previous, position.coordinates());
            if moved < config.distance_filter_meters {
                trace!(moved, "Fix within distance filter, skipping");
                continue;
            }
        }

        last_forwarded = Some(position.coordinates());
        on_update(position);
    }

    debug!("Location stream closed");
}

//! Platform position sources.
//!
//! A [`PositionSource`] is the seam between the engine and whatever actually
//! produces fixes: a gpsd daemon, a mobile OS bridge, or the host pushing
//! readings by hand. Sources report failures as a normalized [`SourceError`].
//!
//! [`ManualPositionSource`] is fed by the host: it receives the permission
//! grant signal and raw fixes from outside (the HTTP ingest endpoint, tests).

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::types::{PermissionStatus, Position};

/// Buffered fixes per subscription before new ones are dropped.
pub const STREAM_CAPACITY: usize = 64;

// ============================================================================
// Errors
// ============================================================================

/// Normalized category of a platform failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    /// The platform refused access to location.
    PermissionDenied,
    /// No position could be determined (no satellites, service down).
    PositionUnavailable,
    /// The platform did not answer in time.
    Timeout,
    /// Anything else.
    Unknown,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission denied",
            Self::PositionUnavailable => "position unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// A failure reported by a position source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
    /// Category of the failure.
    pub kind: SourceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl SourceError {
    /// Create a source error.
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// No position could be determined.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::PositionUnavailable, message)
    }

    /// The request exceeded its timeout.
    #[must_use]
    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(
            SourceErrorKind::Timeout,
            format!("no fix within {} ms", timeout.as_millis()),
        )
    }
}

/// Result type for position sources.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A continuous subscription. Dropping the receiver unsubscribes.
pub type PositionStream = mpsc::Receiver<SourceResult<Position>>;

// ============================================================================
// Requests
// ============================================================================

/// Options passed to a source for one-shot and continuous requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRequest {
    /// How long a one-shot request may wait for a fix.
    pub timeout: Duration,
    /// Oldest cached fix a one-shot request may return.
    pub maximum_age: Duration,
    /// Ask the platform for its most precise mode. Sources without one
    /// (such as the host-fed source) ignore it.
    pub enable_high_accuracy: bool,
}

impl From<&MonitorConfig> for PositionRequest {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.max_age_ms),
            enable_high_accuracy: config.enable_high_accuracy,
        }
    }
}

impl Default for PositionRequest {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

// ============================================================================
// Source trait
// ============================================================================

/// A platform that can report the device's position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Current permission status, without prompting.
    async fn check_permission(&self) -> SourceResult<PermissionStatus>;

    /// Prompt for permission if the platform supports it.
    async fn request_permission(&self) -> SourceResult<PermissionStatus>;

    /// A single fix honoring the request's timeout and maximum age.
    async fn current_position(&self, request: &PositionRequest) -> SourceResult<Position>;

    /// Subscribe to continuous fixes and stream errors.
    async fn watch_position(&self, request: &PositionRequest) -> SourceResult<PositionStream>;
}

// ============================================================================
// Manual source
// ============================================================================

/// A source driven by the host: fixes, errors and the permission signal are
/// pushed in from outside.
pub struct ManualPositionSource {
    permission: Mutex<PermissionStatus>,
    latest: watch::Sender<Option<Position>>,
    subscribers: Mutex<Vec<mpsc::Sender<SourceResult<Position>>>>,
}

impl ManualPositionSource {
    /// Create a source with the given initial permission.
    #[must_use]
    pub fn new(permission: PermissionStatus) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            permission: Mutex::new(permission),
            latest,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Record the host's permission decision.
    pub fn set_permission(&self, status: PermissionStatus) {
        debug!(%status, "Permission signal received");
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Publish a fix to one-shot waiters and every subscriber.
    pub fn push_position(&self, position: Position) {
        self.latest.send_replace(Some(position.clone()));
        self.broadcast(&Ok(position));
    }

    /// Publish a stream error to every subscriber.
    pub fn push_error(&self, error: SourceError) {
        self.broadcast(&Err(error));
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// The most recent fix pushed, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Position> {
        self.latest.borrow().clone()
    }

    fn broadcast(&self, item: &SourceResult<Position>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(item.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Position subscriber is lagging, dropping update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

impl Default for ManualPositionSource {
    fn default() -> Self {
        Self::new(PermissionStatus::Denied)
    }
}

#[async_trait]
impl PositionSource for ManualPositionSource {
    async fn check_permission(&self) -> SourceResult<PermissionStatus> {
        Ok(*self.permission.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn request_permission(&self) -> SourceResult<PermissionStatus> {
        // There is no prompt to show; the host answers through set_permission.
        self.check_permission().await
    }

    async fn current_position(&self, request: &PositionRequest) -> SourceResult<Position> {
        let mut rx = self.latest.subscribe();

        let cached = rx.borrow_and_update().clone();
        if let Some(position) = cached {
            let max_age_ms = u64::try_from(request.maximum_age.as_millis()).unwrap_or(u64::MAX);
            if position.age_ms(Utc::now()) <= max_age_ms {
                return Ok(position);
            }
        }

        match tokio::time::timeout(request.timeout, rx.changed()).await {
            Ok(Ok(())) => rx
                .borrow()
                .clone()
                .ok_or_else(|| SourceError::unavailable("no fix has been reported")),
            Ok(Err(_)) => Err(SourceError::unavailable("position source closed")),
            Err(_) => Err(SourceError::timed_out(request.timeout)),
        }
    }

    async fn watch_position(&self, _request: &PositionRequest) -> SourceResult<PositionStream> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(rx)
    }
}

//! Geofence proximity monitoring.
//!
//! The [`ProximityMonitor`] owns a registry of circular targets and the
//! inside/outside membership of the device for each of them. Evaluation runs
//! on every fix accepted by the [`LocationProvider`] and on a periodic timer
//! (so a stationary device whose platform throttles updates is still
//! re-checked), and emits exactly one `enter` per outside→inside transition
//! and one `exit` per inside→outside transition.
//!
//! ## Concurrency
//!
//! Every evaluation pass (registry read, membership update, event dispatch)
//! runs under a single `evaluation` mutex, so two passes can never interleave
//! their events. Registry and membership live behind a separate, briefly held
//! `state` mutex; handlers may therefore call query and registry methods, and
//! even [`ProximityMonitor::stop_monitoring`], from inside a callback.
//!
//! Handlers must not call [`ProximityMonitor::evaluate_now`] on their own
//! monitor; a nested call is ignored with a warning. Other monitors are
//! independent and may be driven from a handler.

use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigUpdate, MonitorConfig};
use crate::error::{FieldtrackError, Result};
use crate::geo;
use crate::location::{LocationProvider, SharedConfig, TrackingHandle};
use crate::source::PositionSource;
use crate::types::{ProximityCheck, ProximityEvent, ProximityEventKind, ProximityTarget, Position};

/// Events buffered per [`ProximityMonitor::subscribe`] receiver.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Callback invoked for every proximity event.
///
/// Returning an error (or panicking) is logged and does not affect other
/// handlers or the evaluation loop.
pub type EventHandler = Arc<dyn Fn(&ProximityEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identifies a registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Monitors delivering events on this thread, innermost last.
    static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks one monitor as delivering events on the current thread for its lifetime.
struct DispatchGuard;

impl DispatchGuard {
    fn enter(monitor: u64) -> Self {
        DISPATCHING.with(|d| d.borrow_mut().push(monitor));
        Self
    }

    fn active(monitor: u64) -> bool {
        DISPATCHING.with(|d| d.borrow().contains(&monitor))
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.borrow_mut().pop());
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default)]
struct MonitorState {
    /// Registry in insertion order; upserts keep their slot.
    targets: Vec<ProximityTarget>,
    inside: HashSet<String>,
    last_position: Option<Position>,
    monitoring: bool,
    /// Bumped on every start and stop; stale fixes and ticks carry an old value.
    generation: u64,
}

impl MonitorState {
    fn is_current(&self, generation: u64) -> bool {
        self.monitoring && self.generation == generation
    }

    fn target(&self, id: &str) -> Option<&ProximityTarget> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Recompute membership against the last position and return the transitions.
    fn evaluate(&mut self) -> Vec<ProximityEvent> {
        let Some(position) = self.last_position.as_ref() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for target in &self.targets {
            let distance = geo::distance_meters(position.coordinates(), target.center());
            let was_inside = self.inside.contains(&target.id);
            let is_inside = distance <= target.radius_meters;

            let kind = match (was_inside, is_inside) {
                (false, true) => {
                    self.inside.insert(target.id.clone());
                    ProximityEventKind::Enter
                }
                (true, false) => {
                    self.inside.remove(&target.id);
                    ProximityEventKind::Exit
                }
                _ => continue,
            };
            events.push(ProximityEvent::new(target, kind, distance, position));
        }
        events
    }
}

struct Session {
    tracking: TrackingHandle,
    timer: JoinHandle<()>,
}

struct Inner {
    id: u64,
    provider: LocationProvider,
    config: SharedConfig,
    state: Mutex<MonitorState>,
    evaluation: Mutex<()>,
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
    handlers: Mutex<Vec<(HandlerId, EventHandler)>>,
    next_handler: AtomicU64,
    events: broadcast::Sender<ProximityEvent>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evaluation(&self) -> MutexGuard<'_, ()> {
        self.evaluation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a fix from the provider and evaluate it.
    fn accept_position(&self, position: Position, generation: u64) {
        let _evaluation = self.evaluation();
        let events = {
            let mut state = self.state();
            if !state.is_current(generation) {
                trace!("Discarding fix from a stopped monitoring session");
                return;
            }
            state.last_position = Some(position);
            state.evaluate()
        };
        self.dispatch(&events, generation);
    }

    /// Periodic re-evaluation. Returns `false` once the session is over.
    fn tick(&self, generation: u64) -> bool {
        let _evaluation = self.evaluation();
        let events = {
            let mut state = self.state();
            if !state.is_current(generation) {
                return false;
            }
            state.evaluate()
        };
        self.dispatch(&events, generation);
        true
    }

    fn dispatch(&self, events: &[ProximityEvent], generation: u64) {
        if events.is_empty() {
            return;
        }

        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let _guard = DispatchGuard::enter(self.id);

        for event in events {
            // A handler may have stopped monitoring.
            if !self.state().is_current(generation) {
                return;
            }
            info!(
                target_id = %event.target_id,
                target_type = %event.target_type,
                kind = %event.kind,
                distance_meters = event.distance_meters,
                "Proximity event"
            );
            // No subscribers is fine.
            let _ = self.events.send(event.clone());

            for (id, handler) in &handlers {
                if !self.state().is_current(generation) {
                    return;
                }
                match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(handler = id.0, error = %e, "Proximity event handler failed");
                    }
                    Err(_) => error!(handler = id.0, "Proximity event handler panicked"),
                }
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.timer.abort();
        }
    }
}

fn spawn_timer(inner: Weak<Inner>, generation: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if !inner.tick(generation) {
                break;
            }
        }
        trace!("Proximity check timer ended");
    })
}

// ============================================================================
// Monitor
// ============================================================================

/// Tracks the device against a set of geofences and reports boundary crossings.
///
/// Cloning is cheap and yields a handle to the same monitor.
#[derive(Clone)]
pub struct ProximityMonitor {
    inner: Arc<Inner>,
}

impl ProximityMonitor {
    /// Create a stopped monitor reading fixes from `source`.
    ///
    /// `config` is used as given; validate it first when it comes from user input.
    #[must_use]
    pub fn new(source: Arc<dyn PositionSource>, config: MonitorConfig) -> Self {
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                id: NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed),
                provider: LocationProvider::with_shared_config(source, Arc::clone(&config)),
                config,
                state: Mutex::new(MonitorState::default()),
                evaluation: Mutex::new(()),
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                handlers: Mutex::new(Vec::new()),
                next_handler: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// The location provider feeding this monitor (permissions, one-shot fixes).
    #[must_use]
    pub fn provider(&self) -> &LocationProvider {
        &self.inner.provider
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn get_config(&self) -> MonitorConfig {
        *self
            .inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a partial configuration update and return the new configuration.
    ///
    /// A changed check interval takes effect immediately while monitoring.
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::ConfigValidationError`] if the merged
    /// configuration is invalid; nothing is changed in that case.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<MonitorConfig> {
        let (previous, updated) = {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let updated = config.merged(update);
            updated.validate()?;
            let previous = *config;
            *config = updated;
            (previous, updated)
        };
        info!(?update, "Monitor configuration updated");

        if previous.check_interval_secs != updated.check_interval_secs {
            self.restart_timer(updated.check_interval_secs);
        }
        Ok(updated)
    }

    fn restart_timer(&self, interval_secs: u64) {
        // Held across the state check so a concurrent stop cannot slip between.
        let mut session = self.inner.session();
        let Some(session) = session.as_mut() else {
            return;
        };
        let generation = {
            let state = self.inner.state();
            if !state.monitoring {
                return;
            }
            state.generation
        };
        session.timer.abort();
        session.timer = spawn_timer(
            Arc::downgrade(&self.inner),
            generation,
            Duration::from_secs(interval_secs),
        );
        debug!(interval_secs, "Proximity check timer restarted");
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Add a target, or replace the definition of an existing id.
    ///
    /// Replacing keeps the target's current inside/outside state; the next
    /// evaluation compares against the new geometry.
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::InvalidTarget`] if the target fails validation.
    pub fn add_target(&self, target: ProximityTarget) -> Result<()> {
        target.validate()?;
        let mut state = self.inner.state();
        if let Some(existing) = state.targets.iter_mut().find(|t| t.id == target.id) {
            debug!(target_id = %target.id, "Replacing proximity target");
            *existing = target;
        } else {
            debug!(target_id = %target.id, radius = target.radius_meters, "Adding proximity target");
            state.targets.push(target);
        }
        Ok(())
    }

    /// Remove a target and its membership. No exit event is emitted.
    ///
    /// Returns `false` if no such target was registered.
    pub fn remove_target(&self, id: &str) -> bool {
        let mut state = self.inner.state();
        let before = state.targets.len();
        state.targets.retain(|t| t.id != id);
        state.inside.remove(id);
        let removed = state.targets.len() != before;
        if removed {
            debug!(target_id = %id, "Removed proximity target");
        }
        removed
    }

    /// Remove all targets and all membership state.
    pub fn clear_targets(&self) {
        let mut state = self.inner.state();
        state.targets.clear();
        state.inside.clear();
        debug!("Cleared proximity targets");
    }

    /// Registered targets in registration order.
    #[must_use]
    pub fn targets(&self) -> Vec<ProximityTarget> {
        self.inner.state().targets.clone()
    }

    /// A registered target by id.
    #[must_use]
    pub fn target(&self, id: &str) -> Option<ProximityTarget> {
        self.inner.state().target(id).cloned()
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Register a handler. Handlers run synchronously, in registration order,
    /// before the evaluation pass that produced the event returns.
    pub fn add_event_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ProximityEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Unregister a handler. Returns `false` if it was not registered.
    pub fn remove_event_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    /// Receive events asynchronously. Slow receivers may observe `Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProximityEvent> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start tracking and periodic evaluation. Does nothing if already monitoring.
    ///
    /// # Errors
    ///
    /// Propagates permission and subscription errors from the provider; the
    /// monitor stays stopped in that case.
    pub async fn start_monitoring(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_monitoring() {
            debug!("start_monitoring called while already monitoring");
            return Ok(());
        }

        let generation = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.monitoring = true;
            state.generation
        };

        let weak = Arc::downgrade(&self.inner);
        let on_update = move |position: Position| {
            if let Some(inner) = weak.upgrade() {
                inner.accept_position(position, generation);
            }
        };
        let on_error = |e: FieldtrackError| {
            warn!(error = %e, "Location update failed, monitoring continues");
        };

        let tracking = match self.inner.provider.start_tracking(on_update, on_error).await {
            Ok(tracking) => tracking,
            Err(e) => {
                let mut state = self.inner.state();
                if state.generation == generation {
                    state.monitoring = false;
                }
                warn!(error = %e, "Failed to start proximity monitoring");
                return Err(e);
            }
        };

        let interval = Duration::from_secs(self.get_config().check_interval_secs);
        {
            // stop_monitoring flips the state before taking the session, so
            // holding the slot across the check means it either sees this
            // session or the check below fails.
            let mut session = self.inner.session();
            if !self.inner.state().is_current(generation) {
                drop(session);
                // Stopped while the provider was starting.
                self.inner.provider.stop_tracking(tracking);
                return Ok(());
            }
            let timer = spawn_timer(Arc::downgrade(&self.inner), generation, interval);
            *session = Some(Session { tracking, timer });
        }

        info!(
            interval_secs = interval.as_secs(),
            targets = self.inner.state().targets.len(),
            "Proximity monitoring started"
        );
        Ok(())
    }

    /// Stop tracking and the timer and forget all membership. Idempotent.
    ///
    /// No evaluation or event delivery happens after this returns.
    pub fn stop_monitoring(&self) {
        // Wait out an in-flight pass, unless we are that pass's handler.
        let _evaluation = if DispatchGuard::active(self.inner.id) {
            None
        } else {
            Some(self.inner.evaluation())
        };

        {
            let mut state = self.inner.state();
            if !state.monitoring {
                return;
            }
            state.monitoring = false;
            state.generation += 1;
            state.inside.clear();
        }

        if let Some(session) = self.inner.session().take() {
            self.inner.provider.stop_tracking(session.tracking);
            session.timer.abort();
        }
        info!("Proximity monitoring stopped");
    }

    /// Whether the monitor is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.inner.state().monitoring
    }

    /// Run an evaluation pass now against the last known position and return
    /// the events it emitted. Does nothing while stopped.
    pub fn evaluate_now(&self) -> Vec<ProximityEvent> {
        if DispatchGuard::active(self.inner.id) {
            warn!("evaluate_now called from an event handler, ignoring");
            return Vec::new();
        }

        let _evaluation = self.inner.evaluation();
        let (events, generation) = {
            let mut state = self.inner.state();
            if !state.monitoring {
                return Vec::new();
            }
            (state.evaluate(), state.generation)
        };
        self.inner.dispatch(&events, generation);
        events
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Ids of the targets the device is currently inside.
    #[must_use]
    pub fn targets_in_range(&self) -> HashSet<String> {
        self.inner.state().inside.clone()
    }

    /// The most recent accepted fix.
    #[must_use]
    pub fn last_position(&self) -> Option<Position> {
        self.inner.state().last_position.clone()
    }

    /// Check a position (or the last known one) against a target without
    /// touching membership state.
    #[must_use]
    pub fn check_target_proximity(&self, id: &str, position: Option<&Position>) -> ProximityCheck {
        let state = self.inner.state();
        let Some(target) = state.target(id) else {
            return ProximityCheck::UNKNOWN;
        };
        let Some(position) = position.or(state.last_position.as_ref()) else {
            return ProximityCheck::UNKNOWN;
        };

        let distance = geo::distance_meters(position.coordinates(), target.center());
        ProximityCheck {
            is_in_range: distance <= target.radius_meters,
            distance_meters: Some(distance),
        }
    }

    /// Distance from the last known position to a target's center.
    #[must_use]
    pub fn distance_to_target(&self, id: &str) -> Option<f64> {
        self.check_target_proximity(id, None).distance_meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetType;

    fn target(id: &str, latitude: f64, radius: f64) -> ProximityTarget {
        ProximityTarget::new(id, id.to_uppercase(), latitude, 0.0, radius, TargetType::Asset)
    }

    fn at(latitude: f64) -> Position {
        Position::new(latitude, 0.0, 5.0).unwrap()
    }

    fn state_with(targets: Vec<ProximityTarget>) -> MonitorState {
        MonitorState {
            targets,
            monitoring: true,
            ..MonitorState::default()
        }
    }

    #[test]
    fn test_evaluate_without_position_is_noop() {
        let mut state = state_with(vec![target("a", 0.0, 100.0)]);
        assert!(state.evaluate().is_empty());
        assert!(state.inside.is_empty());
    }

    #[test]
    fn test_enter_then_steady_then_exit() {
        let mut state = state_with(vec![target("a", 0.0, 100.0)]);

        // ~1.1 km away: outside, no event
        state.last_position = Some(at(0.01));
        assert!(state.evaluate().is_empty());

        // ~55 m away: enter
        state.last_position = Some(at(0.0005));
        let events = state.evaluate();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ProximityEventKind::Enter);
        assert!(events[0].distance_meters < 100.0);
        assert!(state.inside.contains("a"));

        // Still inside: silent, repeatedly
        state.last_position = Some(at(0.0001));
        assert!(state.evaluate().is_empty());
        assert!(state.evaluate().is_empty());

        // Back out: exit
        state.last_position = Some(at(0.01));
        let events = state.evaluate();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ProximityEventKind::Exit);
        assert!(events[0].distance_meters > 100.0);
        assert!(state.inside.is_empty());
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let mut state = state_with(vec![target("a", 0.0, 100.0)]);
        let position = at(0.0005);
        let exact = geo::distance_meters(position.coordinates(), state.targets[0].center());
        state.targets[0].radius_meters = exact;
        state.last_position = Some(position);

        let events = state.evaluate();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ProximityEventKind::Enter);
    }

    #[test]
    fn test_events_follow_registry_order() {
        let mut state = state_with(vec![
            target("b", 0.0, 500.0),
            target("a", 0.0, 500.0),
            target("c", 0.0, 500.0),
        ]);
        state.last_position = Some(at(0.0));

        let ids: Vec<String> = state.evaluate().into_iter().map(|e| e.target_id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_event_carries_target_and_position() {
        let mut state = state_with(vec![ProximityTarget::new(
            "wo-7",
            "Pump repair",
            0.0,
            0.0,
            200.0,
            TargetType::WorkOrder,
        )]);
        state.last_position = Some(at(0.0001));

        let event = state.evaluate().remove(0);
        assert_eq!(event.target_id, "wo-7");
        assert_eq!(event.target_name, "Pump repair");
        assert_eq!(event.target_type, TargetType::WorkOrder);
        assert_eq!(event.position, at(0.0001).captured_at(event.position.captured_at_utc));
    }

    #[tokio::test]
    async fn test_add_then_remove_leaves_no_membership() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());

        monitor.add_target(target("a", 0.0, 100.0)).unwrap();
        assert!(monitor.remove_target("a"));
        assert!(!monitor.remove_target("a"));
        assert!(monitor.targets_in_range().is_empty());
        assert!(monitor.targets().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_registry_slot() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());

        monitor.add_target(target("a", 0.0, 100.0)).unwrap();
        monitor.add_target(target("b", 0.0, 100.0)).unwrap();
        monitor.add_target(target("a", 1.0, 250.0)).unwrap();

        let targets = monitor.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "a");
        assert!((targets[0].radius_meters - 250.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());

        let result = monitor.add_target(target("a", 0.0, -5.0));
        assert!(matches!(result, Err(FieldtrackError::InvalidTarget(_))));
        assert!(monitor.targets().is_empty());
    }

    #[tokio::test]
    async fn test_check_target_proximity_is_pure() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());
        monitor.add_target(target("a", 0.0, 100.0)).unwrap();

        assert_eq!(
            monitor.check_target_proximity("a", None),
            ProximityCheck::UNKNOWN
        );
        assert_eq!(
            monitor.check_target_proximity("missing", Some(&at(0.0))),
            ProximityCheck::UNKNOWN
        );

        let check = monitor.check_target_proximity("a", Some(&at(0.0001)));
        assert!(check.is_in_range);
        assert!(check.distance_meters.unwrap() < 100.0);
        assert!(monitor.targets_in_range().is_empty());
        assert_eq!(monitor.distance_to_target("a"), None);
    }

    #[tokio::test]
    async fn test_update_config_is_partial_and_validated() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());
        let before = monitor.get_config();

        let after = monitor
            .update_config(&ConfigUpdate {
                timeout_ms: Some(25_000),
                ..ConfigUpdate::default()
            })
            .unwrap();
        assert_eq!(after.timeout_ms, 25_000);
        assert_eq!(
            MonitorConfig {
                timeout_ms: before.timeout_ms,
                ..after
            },
            before
        );
        assert_eq!(monitor.provider().config().timeout_ms, 25_000);

        let rejected = monitor.update_config(&ConfigUpdate {
            check_interval_secs: Some(0),
            ..ConfigUpdate::default()
        });
        assert!(matches!(
            rejected,
            Err(FieldtrackError::ConfigValidationError(_))
        ));
        assert_eq!(monitor.get_config(), after);
    }

    #[tokio::test]
    async fn test_config_snapshot_is_a_copy() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());

        let mut snapshot = monitor.get_config();
        snapshot.accuracy_threshold_meters = 1.0;
        assert!((monitor.get_config().accuracy_threshold_meters - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_handler_registration() {
        let source = Arc::new(crate::source::ManualPositionSource::default());
        let monitor = ProximityMonitor::new(source, MonitorConfig::default());

        let first = monitor.add_event_handler(|_| Ok(()));
        let second = monitor.add_event_handler(|_| Ok(()));
        assert_ne!(first, second);
        assert!(monitor.remove_event_handler(first));
        assert!(!monitor.remove_event_handler(first));
    }
}

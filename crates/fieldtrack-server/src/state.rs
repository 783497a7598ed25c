//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fieldtrack_core::{
    AppConfig, ManualPositionSource, MonitorConfig, PermissionStatus, PositionSource,
    ProximityEvent, ProximityMonitor, SourceKind,
};
use tracing::info;
use uuid::Uuid;

/// Number of proximity events kept for `GET /api/events`.
pub const RECENT_EVENTS_CAPACITY: usize = 200;

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Everything the handlers need: the monitor and what feeds it.
pub struct AppState {
    /// The proximity monitor (and, through it, the location provider).
    pub monitor: ProximityMonitor,
    manual_source: Option<Arc<ManualPositionSource>>,
    source_kind: SourceKind,
    recent_events: Arc<Mutex<VecDeque<ProximityEvent>>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around a host-fed source.
    pub fn manual(source: Arc<ManualPositionSource>, config: MonitorConfig) -> SharedState {
        let monitor = ProximityMonitor::new(source.clone(), config);
        Self::assemble(monitor, Some(source), SourceKind::Manual)
    }

    /// Create state around any other source.
    pub fn with_source(
        source: Arc<dyn PositionSource>,
        kind: SourceKind,
        config: MonitorConfig,
    ) -> SharedState {
        Self::assemble(ProximityMonitor::new(source, config), None, kind)
    }

    /// Create state from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured source is not compiled in.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<SharedState> {
        let state = match config.source.kind {
            SourceKind::Manual => Self::manual(
                Arc::new(ManualPositionSource::new(PermissionStatus::Denied)),
                config.monitor,
            ),
            #[cfg(feature = "gpsd")]
            SourceKind::Gpsd => Self::with_source(
                Arc::new(fieldtrack_core::GpsdSource::from_config(&config.source)),
                SourceKind::Gpsd,
                config.monitor,
            ),
            #[cfg(not(feature = "gpsd"))]
            SourceKind::Gpsd => {
                anyhow::bail!("source.kind = \"gpsd\" requires the `gpsd` feature")
            }
        };
        info!(source = ?config.source.kind, "Position source ready");
        Ok(state)
    }

    fn assemble(
        monitor: ProximityMonitor,
        manual_source: Option<Arc<ManualPositionSource>>,
        source_kind: SourceKind,
    ) -> SharedState {
        let recent_events = Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAPACITY)));

        let sink = Arc::clone(&recent_events);
        monitor.add_event_handler(move |event| {
            let mut events = sink.lock().unwrap_or_else(PoisonError::into_inner);
            if events.len() == RECENT_EVENTS_CAPACITY {
                events.pop_front();
            }
            events.push_back(event.clone());
            Ok(())
        });

        Arc::new(Self {
            monitor,
            manual_source,
            source_kind,
            recent_events,
            started_at: Utc::now(),
        })
    }

    /// The host-fed source, when the server runs with one.
    #[must_use]
    pub fn manual_source(&self) -> Option<&Arc<ManualPositionSource>> {
        self.manual_source.as_ref()
    }

    /// Which kind of source feeds the monitor.
    #[must_use]
    pub const fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// When the state was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Recorded events, oldest first, optionally only those after `after`.
    ///
    /// An unknown `after` id returns everything still buffered.
    #[must_use]
    pub fn recent_events(&self, after: Option<Uuid>, limit: usize) -> Vec<ProximityEvent> {
        let events = self
            .recent_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let start = after
            .and_then(|id| events.iter().position(|e| e.id == id))
            .map_or(0, |index| index + 1);

        events.iter().skip(start).take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldtrack_core::{Position, ProximityTarget, TargetType};

    #[tokio::test]
    async fn test_events_are_recorded_and_paged() {
        let source = Arc::new(ManualPositionSource::new(PermissionStatus::Granted));
        let state = AppState::manual(source.clone(), MonitorConfig::default());
        for id in ["a", "b", "c"] {
            state
                .monitor
                .add_target(ProximityTarget::new(id, id, 0.0, 0.0, 100.0, TargetType::Asset))
                .unwrap();
        }

        state.monitor.start_monitoring().await.unwrap();
        source.push_position(Position::new(0.0, 0.0, 5.0).unwrap());
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while state.recent_events(None, 10).len() < 3 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let all = state.recent_events(None, 10);
        let ids: Vec<_> = all.iter().map(|e| e.target_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let after_first = state.recent_events(Some(all[0].id), 10);
        assert_eq!(after_first.len(), 2);
        assert_eq!(state.recent_events(None, 1).len(), 1);
        assert_eq!(state.recent_events(Some(Uuid::nil()), 10).len(), 3);

        state.monitor.stop_monitoring();
    }
}

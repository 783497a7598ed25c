//! Shared domain types and OpenAPI schemas.
//!
//! Positions, geofence targets and the events emitted when the device crosses
//! a target boundary. These types are shared by the location provider, the
//! proximity monitor and the HTTP layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{FieldtrackError, Result};
use crate::geo::Coordinates;

// ============================================================================
// Positions
// ============================================================================

/// A single location fix produced by a position source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 40.7128,
    "longitude": -74.006,
    "accuracy_meters": 8.5,
    "altitude_meters": 12.0,
    "heading_degrees": null,
    "speed_mps": 0.0,
    "captured_at_utc": "2025-01-15T14:30:00Z"
}))]
pub struct Position {
    /// Latitude in decimal degrees.
    #[schema(example = 40.7128)]
    pub latitude: f64,

    /// Longitude in decimal degrees.
    #[schema(example = -74.006)]
    pub longitude: f64,

    /// Radius of uncertainty in meters. Never negative.
    #[schema(example = 8.5, minimum = 0)]
    pub accuracy_meters: f64,

    /// Altitude above sea level in meters, if reported.
    pub altitude_meters: Option<f64>,

    /// Direction of travel in degrees from true north, if reported.
    pub heading_degrees: Option<f64>,

    /// Ground speed in meters per second, if reported.
    pub speed_mps: Option<f64>,

    /// When the fix was captured.
    pub captured_at_utc: DateTime<Utc>,
}

impl Position {
    /// Create a fix captured now, without altitude, heading or speed.
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::InvalidPosition`] if the coordinates are out
    /// of range or the accuracy is negative or not finite.
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Result<Self> {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            altitude_meters: None,
            heading_degrees: None,
            speed_mps: None,
            captured_at_utc: Utc::now(),
        }
        .validated()
    }

    /// Check the invariants of a fix built field by field (for example one
    /// deserialized from a request body).
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::InvalidPosition`] describing the first
    /// violated invariant.
    pub fn validated(self) -> Result<Self> {
        Coordinates::new(self.latitude, self.longitude)
            .map_err(|e| FieldtrackError::InvalidPosition(e.to_string()))?;
        if !self.accuracy_meters.is_finite() || self.accuracy_meters < 0.0 {
            return Err(FieldtrackError::InvalidPosition(format!(
                "accuracy must be a non-negative number of meters (got {})",
                self.accuracy_meters
            )));
        }
        Ok(self)
    }

    /// Set the capture timestamp.
    #[must_use]
    pub fn captured_at(mut self, captured_at_utc: DateTime<Utc>) -> Self {
        self.captured_at_utc = captured_at_utc;
        self
    }

    /// The fix's coordinates.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new_unchecked(self.latitude, self.longitude)
    }

    /// Age of the fix relative to `now`, in milliseconds. Fixes from the
    /// future count as fresh.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.captured_at_utc).num_milliseconds()).unwrap_or(0)
    }
}

// ============================================================================
// Permissions
// ============================================================================

/// Location permission state reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Location access is allowed.
    Granted,
    /// The user declined; asking again may succeed.
    Denied,
    /// The user declined and asked not to be prompted again.
    DeniedPermanently,
    /// Access is blocked by policy (parental controls, device management).
    Restricted,
}

impl PermissionStatus {
    /// Whether location readings may be taken.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Turn a non-granted status into the matching error.
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::PermissionRestricted`] for
    /// [`PermissionStatus::Restricted`] and
    /// [`FieldtrackError::PermissionDenied`] for both denied states.
    pub fn ensure_granted(self) -> Result<()> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied => Err(FieldtrackError::PermissionDenied { permanent: false }),
            Self::DeniedPermanently => Err(FieldtrackError::PermissionDenied { permanent: true }),
            Self::Restricted => Err(FieldtrackError::PermissionRestricted),
        }
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::DeniedPermanently => "denied_permanently",
            Self::Restricted => "restricted",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Targets
// ============================================================================

/// What a geofence is drawn around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// An open work order at a customer site.
    WorkOrder,
    /// A fleet asset (vehicle, generator, trailer).
    Asset,
    /// A named location such as a depot or yard.
    Location,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WorkOrder => "work_order",
            Self::Asset => "asset",
            Self::Location => "location",
        };
        f.write_str(s)
    }
}

/// A circular region monitored for enter/exit transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "wo-1042",
    "name": "Replace hydraulic pump - Depot 7",
    "latitude": 40.7128,
    "longitude": -74.006,
    "radius_meters": 150.0,
    "target_type": "work_order"
}))]
pub struct ProximityTarget {
    /// Unique identifier within one monitor.
    #[schema(example = "wo-1042")]
    pub id: String,

    /// Display name.
    #[schema(example = "Replace hydraulic pump - Depot 7")]
    pub name: String,

    /// Center latitude in decimal degrees.
    #[schema(example = 40.7128)]
    pub latitude: f64,

    /// Center longitude in decimal degrees.
    #[schema(example = -74.006)]
    pub longitude: f64,

    /// Geofence radius in meters. Always positive.
    #[schema(example = 150.0)]
    pub radius_meters: f64,

    /// What the geofence surrounds.
    pub target_type: TargetType,
}

impl ProximityTarget {
    /// Create a target.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        target_type: TargetType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            radius_meters,
            target_type,
        }
    }

    /// Check the target before it enters a registry.
    ///
    /// # Errors
    ///
    /// Returns [`FieldtrackError::InvalidTarget`] for an empty id, coordinates
    /// out of range, or a radius that is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FieldtrackError::InvalidTarget(
                "target id cannot be empty".into(),
            ));
        }
        Coordinates::new(self.latitude, self.longitude).map_err(|e| {
            FieldtrackError::InvalidTarget(format!("target '{}': {e}", self.id))
        })?;
        if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
            return Err(FieldtrackError::InvalidTarget(format!(
                "target '{}': radius must be greater than 0 meters (got {})",
                self.id, self.radius_meters
            )));
        }
        Ok(())
    }

    /// The geofence center.
    #[must_use]
    pub const fn center(&self) -> Coordinates {
        Coordinates::new_unchecked(self.latitude, self.longitude)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Direction of a boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProximityEventKind {
    /// The device moved from outside to inside the radius.
    Enter,
    /// The device moved from inside to outside the radius.
    Exit,
}

impl fmt::Display for ProximityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => f.write_str("enter"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// A membership transition for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProximityEvent {
    /// Unique event id (time-ordered).
    pub id: Uuid,

    /// Id of the target whose boundary was crossed.
    #[schema(example = "wo-1042")]
    pub target_id: String,

    /// Display name of the target at the time of the crossing.
    pub target_name: String,

    /// Type of the target.
    pub target_type: TargetType,

    /// Enter or exit.
    pub kind: ProximityEventKind,

    /// Distance from the target center when the transition was detected.
    #[schema(example = 87.3)]
    pub distance_meters: f64,

    /// When the transition was detected.
    pub occurred_at_utc: DateTime<Utc>,

    /// The fix that triggered the transition.
    pub position: Position,
}

impl ProximityEvent {
    pub(crate) fn new(
        target: &ProximityTarget,
        kind: ProximityEventKind,
        distance_meters: f64,
        position: &Position,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            target_type: target.target_type,
            kind,
            distance_meters,
            occurred_at_utc: Utc::now(),
            position: position.clone(),
        }
    }
}

/// Result of a side-effect-free proximity check against one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProximityCheck {
    /// Whether the position lies within the target's radius.
    pub is_in_range: bool,

    /// Distance to the target center, or `None` when the target or a
    /// position is unavailable.
    pub distance_meters: Option<f64>,
}

impl ProximityCheck {
    /// The answer when there is nothing to measure.
    pub const UNKNOWN: Self = Self {
        is_in_range: false,
        distance_meters: None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rejects_negative_accuracy() {
        assert!(matches!(
            Position::new(10.0, 10.0, -1.0),
            Err(FieldtrackError::InvalidPosition(_))
        ));
        assert!(Position::new(10.0, 10.0, 0.0).is_ok());
    }

    #[test]
    fn test_position_rejects_out_of_range_coordinates() {
        assert!(Position::new(91.0, 0.0, 5.0).is_err());
        assert!(Position::new(0.0, -180.5, 5.0).is_err());
    }

    #[test]
    fn test_position_age() {
        let now = Utc::now();
        let fix = Position::new(1.0, 1.0, 5.0)
            .unwrap()
            .captured_at(now - chrono::Duration::milliseconds(2500));
        assert_eq!(fix.age_ms(now), 2500);

        let future = fix.captured_at(now + chrono::Duration::seconds(5));
        assert_eq!(future.age_ms(now), 0);
    }

    #[test]
    fn test_permission_status_to_error() {
        assert!(PermissionStatus::Granted.ensure_granted().is_ok());
        assert!(matches!(
            PermissionStatus::Denied.ensure_granted(),
            Err(FieldtrackError::PermissionDenied { permanent: false })
        ));
        assert!(matches!(
            PermissionStatus::DeniedPermanently.ensure_granted(),
            Err(FieldtrackError::PermissionDenied { permanent: true })
        ));
        assert!(matches!(
            PermissionStatus::Restricted.ensure_granted(),
            Err(FieldtrackError::PermissionRestricted)
        ));
    }

    #[test]
    fn test_target_validation() {
        let target = ProximityTarget::new("a-1", "Generator", 45.0, 7.0, 50.0, TargetType::Asset);
        assert!(target.validate().is_ok());

        let mut bad = target.clone();
        bad.radius_meters = 0.0;
        assert!(matches!(bad.validate(), Err(FieldtrackError::InvalidTarget(_))));

        let mut bad = target.clone();
        bad.id = "  ".into();
        assert!(bad.validate().is_err());

        let mut bad = target;
        bad.latitude = 120.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(
            serde_json::to_string(&TargetType::WorkOrder).unwrap(),
            "\"work_order\""
        );
        assert_eq!(
            serde_json::to_string(&PermissionStatus::DeniedPermanently).unwrap(),
            "\"denied_permanently\""
        );
        assert_eq!(
            serde_json::to_string(&ProximityEventKind::Exit).unwrap(),
            "\"exit\""
        );
        assert_eq!(TargetType::Location.to_string(), "location");
    }
}

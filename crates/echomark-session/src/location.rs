//! Room descriptors and claimed positions.
//!
//! A room is anchored either at GPS coordinates or at a BLE beacon, with an
//! allowed radius in metres. A student device reports either its own
//! coordinates or the beacon it heard and the estimated range to it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG), in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ---------------------------------------------------------------------------
// GeoPoint
// ---------------------------------------------------------------------------

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `true` if both coordinates are finite and within their ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Room side
// ---------------------------------------------------------------------------

/// What a room's position is measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    /// Fixed coordinates, typically the lecture hall's centre.
    Point(GeoPoint),
    /// A BLE beacon mounted in the room.
    Beacon { id: String },
}

/// Where a session takes place and how far away a device may be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLocation {
    /// Human-readable name, e.g. "Room 101".
    pub label: String,
    pub anchor: Anchor,
    /// Allowed distance from the anchor, in metres.
    pub radius_m: f64,
}

impl RoomLocation {
    /// A room centred on coordinates.
    pub fn point(label: impl Into<String>, at: GeoPoint, radius_m: f64) -> Self {
        Self {
            label: label.into(),
            anchor: Anchor::Point(at),
            radius_m,
        }
    }

    /// A room identified by a beacon.
    pub fn beacon(label: impl Into<String>, id: impl Into<String>, radius_m: f64) -> Self {
        Self {
            label: label.into(),
            anchor: Anchor::Beacon { id: id.into() },
            radius_m,
        }
    }

    /// Checks the descriptor is usable, given the largest radius allowed.
    ///
    /// Returns a description of the first problem found.
    pub fn check(&self, max_radius_m: f64) -> Result<(), String> {
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(format!("radius must be positive, got {}", self.radius_m));
        }
        if self.radius_m > max_radius_m {
            return Err(format!(
                "radius {} m exceeds the {} m limit",
                self.radius_m, max_radius_m
            ));
        }
        match &self.anchor {
            Anchor::Point(p) if !p.is_valid() => Err(format!("coordinates {p} out of range")),
            Anchor::Beacon { id } if id.trim().is_empty() => Err("beacon id is empty".into()),
            _ => Ok(()),
        }
    }

    /// Whether a claimed position lies inside the room.
    ///
    /// The radius is inclusive. A claim of the wrong kind (coordinates for
    /// a beacon room, or a beacon for a coordinate room) never matches, and
    /// neither do malformed coordinates or negative beacon ranges.
    pub fn contains(&self, claimed: &ClaimedLocation) -> bool {
        match (&self.anchor, claimed) {
            (Anchor::Point(centre), ClaimedLocation::Point(p)) => {
                p.is_valid() && centre.distance_m(p) <= self.radius_m
            }
            (Anchor::Beacon { id }, ClaimedLocation::Beacon { id: heard, distance_m }) => {
                id == heard
                    && distance_m.is_finite()
                    && *distance_m >= 0.0
                    && *distance_m <= self.radius_m
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Device side
// ---------------------------------------------------------------------------

/// Position reported by a student device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimedLocation {
    Point(GeoPoint),
    Beacon { id: String, distance_m: f64 },
}

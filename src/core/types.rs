//! Core data types for the positioning bridge
//!
//! Every type here is an immutable value once constructed. Timestamps are
//! milliseconds since the Unix epoch, as reported by the producer.

use crate::api::types::{BridgeError, BridgeResult};
use crate::core::constants::{EARTH_RADIUS_M, MIN_QUATERNION_NORM};
use crate::geofence::Geofence;
use nalgebra::{Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Free-form diagnostic dictionary delivered through `on_extra_info`
pub type ExtraInfo = serde_json::Map<String, serde_json::Value>;

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and inside the WGS84 latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another coordinate in meters (haversine)
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// Logical building floor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    /// Floor number, 0 being the ground floor
    pub level: i32,
    /// Probability that the level is correct (0.0 to 1.0)
    pub certainty: Option<f64>,
}

impl Floor {
    pub fn new(level: i32) -> Self {
        Self { level, certainty: None }
    }

    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = Some(certainty.clamp(0.0, 1.0));
        self
    }

    /// Floors match on level; certainty is informational
    pub fn same_level(&self, other: &Floor) -> bool {
        self.level == other.level
    }
}

/// Plain region type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionType {
    Unknown,
    FloorPlan,
    Venue,
    Geofence,
}

/// Type-specific region payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "geofence", rename_all = "kebab-case")]
pub enum RegionKind {
    /// Reported by a producer that does not classify its regions
    Unknown,
    /// Identifier is the floor plan id
    FloorPlan,
    /// Identifier is the venue id
    Venue,
    /// User-defined geofence with its geometry
    Geofence(Arc<Geofence>),
}

/// A region on Earth, as delivered in enter/exit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Unique within its region type
    pub identifier: String,
    /// Human readable name
    pub name: Option<String>,
    /// Timestamp of the event this region was reported with
    pub timestamp_ms: Option<u64>,
    pub kind: RegionKind,
}

impl Region {
    fn with_kind(identifier: impl Into<String>, kind: RegionKind) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            timestamp_ms: None,
            kind,
        }
    }

    pub fn unknown(identifier: impl Into<String>) -> Self {
        Self::with_kind(identifier, RegionKind::Unknown)
    }

    pub fn floor_plan(identifier: impl Into<String>) -> Self {
        Self::with_kind(identifier, RegionKind::FloorPlan)
    }

    pub fn venue(identifier: impl Into<String>) -> Self {
        Self::with_kind(identifier, RegionKind::Venue)
    }

    /// Region view of a registered geofence
    pub fn geofence(geofence: Arc<Geofence>) -> Self {
        Self {
            identifier: geofence.identifier().to_string(),
            name: geofence.name().map(str::to_string),
            timestamp_ms: None,
            kind: RegionKind::Geofence(geofence),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn region_type(&self) -> RegionType {
        match self.kind {
            RegionKind::Unknown => RegionType::Unknown,
            RegionKind::FloorPlan => RegionType::FloorPlan,
            RegionKind::Venue => RegionType::Venue,
            RegionKind::Geofence(_) => RegionType::Geofence,
        }
    }

    /// The geofence behind this region, if it is one
    pub fn as_geofence(&self) -> Option<&Arc<Geofence>> {
        match &self.kind {
            RegionKind::Geofence(geofence) => Some(geofence),
            _ => None,
        }
    }

    pub fn key(&self) -> RegionKey {
        RegionKey {
            identifier: self.identifier.clone(),
            region_type: self.region_type(),
        }
    }
}

/// Identity of a region for membership tracking.
///
/// Orders by identifier first so simultaneous transitions come out in
/// ascending identifier order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionKey {
    pub identifier: String,
    pub region_type: RegionType,
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.region_type, self.identifier)
    }
}

/// A reported indoor position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    /// Radius of uncertainty (m)
    pub accuracy_m: f64,
    pub floor: Option<Floor>,
    /// Region the location was obtained from
    pub region: Option<Region>,
    pub timestamp_ms: u64,
}

impl Location {
    pub fn new(coordinate: Coordinate, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self {
            coordinate,
            accuracy_m,
            floor: None,
            region: None,
            timestamp_ms,
        }
    }

    pub fn with_floor(mut self, floor: Floor) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Horizontal displacement from another location (m)
    pub fn displacement_from(&self, other: &Location) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }
}

/// Device heading relative to true north
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Degrees in [0, 360)
    pub true_heading_deg: f64,
    pub timestamp_ms: u64,
}

impl Heading {
    /// Wraps any finite angle into [0, 360)
    pub fn new(true_heading_deg: f64, timestamp_ms: u64) -> BridgeResult<Self> {
        if !true_heading_deg.is_finite() {
            return Err(BridgeError::InvalidHeading { degrees: true_heading_deg });
        }
        let mut wrapped = true_heading_deg.rem_euclid(360.0);
        // rem_euclid rounds tiny negatives up to exactly 360
        if wrapped >= 360.0 {
            wrapped = 0.0;
        }
        Ok(Self {
            true_heading_deg: wrapped,
            timestamp_ms,
        })
    }

    /// Smallest angle between two headings, in [0, 180]
    pub fn delta_deg(&self, other: &Heading) -> f64 {
        let diff = (self.true_heading_deg - other.true_heading_deg).abs() % 360.0;
        diff.min(360.0 - diff)
    }
}

/// Device orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub quaternion: UnitQuaternion<f64>,
    pub timestamp_ms: u64,
}

impl Attitude {
    /// Normalises the raw quaternion; zero-length or non-finite input is rejected
    pub fn new(w: f64, x: f64, y: f64, z: f64, timestamp_ms: u64) -> BridgeResult<Self> {
        let raw = Quaternion::new(w, x, y, z);
        let finite = [w, x, y, z].iter().all(|c| c.is_finite());
        let quaternion = if finite {
            UnitQuaternion::try_new(raw, MIN_QUATERNION_NORM)
        } else {
            None
        };
        match quaternion {
            Some(quaternion) => Ok(Self { quaternion, timestamp_ms }),
            None => Err(BridgeError::InvalidAttitude {
                components: [w, x, y, z],
            }),
        }
    }

    pub fn from_unit(quaternion: UnitQuaternion<f64>, timestamp_ms: u64) -> Self {
        Self { quaternion, timestamp_ms }
    }

    /// Rotation angle separating two orientations, in degrees
    pub fn delta_deg(&self, other: &Attitude) -> f64 {
        self.quaternion.angle_to(&other.quaternion).to_degrees()
    }
}

/// Positioning service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Not available and not expected to recover soon
    OutOfService,
    /// Temporarily unavailable, typically no network
    Unavailable,
    Available,
    /// Running with reduced accuracy or functionality
    Limited,
}

impl Status {
    /// Numeric code used by the native SDK
    pub fn code(&self) -> i32 {
        match self {
            Status::OutOfService => 0,
            Status::Unavailable => 1,
            Status::Available => 2,
            Status::Limited => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::OutOfService),
            1 => Some(Status::Unavailable),
            2 => Some(Status::Available),
            10 => Some(Status::Limited),
            _ => None,
        }
    }
}

/// Coarse confidence in the producer's sensor calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationQuality {
    Poor,
    Good,
    Excellent,
}

/// Requested positioning accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccuracyMode {
    #[default]
    Best,
    /// Less processing to reduce power drain
    LowPower,
}

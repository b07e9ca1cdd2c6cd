//! Common API types and data structures

use crate::core::{Floor, Location, Region};
use crate::dispatch::DispatchStats;
use crate::geofence::GeometryError;
use crate::producer::ProducerError;
use crate::session::SessionStats;
use crate::utils::config::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Malformed geofence; the registry is left unchanged
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("heading must be a finite number of degrees, got {degrees}")]
    InvalidHeading { degrees: f64 },

    #[error("attitude quaternion {components:?} cannot be normalised")]
    InvalidAttitude { components: [f64; 4] },

    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),
}

/// Explicit position input supplied by the host application.
///
/// Hints are forwarded to the producer. Floor plan and venue hints also lock
/// the context attached to subsequent fixes; no hint bypasses filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LocationHint {
    /// Position passed to the producer only; does not seed the filters or lock floor or venue
    Coordinate { location: Location },
    /// Locks positioning to one floor plan
    FloorPlan { floor_plan_id: String },
    /// Locks positioning to a venue, and to a floor when one is given
    Venue { venue_id: String, floor: Option<Floor> },
}

impl LocationHint {
    pub fn coordinate(location: Location) -> Self {
        LocationHint::Coordinate { location }
    }

    pub fn floor_plan(floor_plan_id: impl Into<String>) -> Self {
        LocationHint::FloorPlan {
            floor_plan_id: floor_plan_id.into(),
        }
    }

    pub fn venue(venue_id: impl Into<String>, floor: Option<Floor>) -> Self {
        LocationHint::Venue {
            venue_id: venue_id.into(),
            floor,
        }
    }

    /// Region attached to fixes that arrive without one
    pub fn locked_region(&self) -> Option<Region> {
        match self {
            LocationHint::Coordinate { .. } => None,
            LocationHint::FloorPlan { floor_plan_id } => Some(Region::floor_plan(floor_plan_id.clone())),
            LocationHint::Venue { venue_id, .. } => Some(Region::venue(venue_id.clone())),
        }
    }

    /// Floor attached to fixes that arrive without one
    pub fn locked_floor(&self) -> Option<Floor> {
        match self {
            LocationHint::Venue { floor, .. } => *floor,
            _ => None,
        }
    }
}

/// Counters describing bridge activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub session: SessionStats,
    pub dispatch: DispatchStats,
}

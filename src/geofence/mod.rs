//! User-defined polygonal geofences and the registry that monitors them

pub mod geometry;
pub mod registry;

pub use geometry::BoundingBox;
pub use registry::GeofenceRegistry;

use crate::core::{Coordinate, Floor, Location};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a geofence definition is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geofence identifier must not be empty")]
    EmptyIdentifier,

    #[error("geofence '{identifier}' needs at least 3 unique points, got {count}")]
    TooFewPoints { identifier: String, count: usize },

    #[error("geofence '{identifier}' edge list has odd length {len}")]
    OddEdgeList { identifier: String, len: usize },

    #[error("geofence '{identifier}' has invalid coordinate at index {index}")]
    InvalidCoordinate { identifier: String, index: usize },

    #[error("geofence '{identifier}' polygon has zero area")]
    DegenerateArea { identifier: String },

    #[error("geofence '{identifier}' bounding box does not enclose its polygon")]
    BoundingBoxMismatch { identifier: String },
}

/// Serialized form of a geofence; converted through validation on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceDefinition {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub floor: Option<Floor>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    pub points: Vec<Coordinate>,
}

/// A polygonal region monitored for enter/exit transitions.
///
/// The stored point list is clockwise, has no repeated consecutive points and
/// is fully enclosed by the bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeofenceDefinition", into = "GeofenceDefinition")]
pub struct Geofence {
    identifier: String,
    name: Option<String>,
    floor: Option<Floor>,
    bounding_box: BoundingBox,
    points: Vec<Coordinate>,
}

impl Geofence {
    /// Creates a polygon geofence; the bounding box is derived from the points
    pub fn polygon(
        identifier: impl Into<String>,
        floor: Option<Floor>,
        points: Vec<Coordinate>,
    ) -> Result<Self, GeometryError> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(GeometryError::EmptyIdentifier);
        }
        if let Some(index) = points.iter().position(|p| !p.is_valid()) {
            return Err(GeometryError::InvalidCoordinate { identifier, index });
        }

        let mut points = points;
        points.dedup();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            let count = points.len();
            return Err(GeometryError::TooFewPoints { identifier, count });
        }

        let area2 = geometry::signed_area2(&points);
        if area2.abs() <= f64::EPSILON {
            return Err(GeometryError::DegenerateArea { identifier });
        }
        if area2 > 0.0 {
            points.reverse();
        }

        let bounding_box = match BoundingBox::enclosing(&points) {
            Some(bbox) => bbox,
            None => return Err(GeometryError::TooFewPoints { identifier, count: 0 }),
        };

        Ok(Self {
            identifier,
            name: None,
            floor,
            bounding_box,
            points,
        })
    }

    /// Creates a polygon from a flat `[lat, lon, lat, lon, ...]` edge list
    pub fn from_flat_edges(
        identifier: impl Into<String>,
        floor: Option<Floor>,
        edges: &[f64],
    ) -> Result<Self, GeometryError> {
        let identifier = identifier.into();
        if edges.len() % 2 != 0 {
            return Err(GeometryError::OddEdgeList {
                identifier,
                len: edges.len(),
            });
        }
        let points = edges
            .chunks_exact(2)
            .map(|pair| Coordinate::new(pair[0], pair[1]))
            .collect();
        Self::polygon(identifier, floor, points)
    }

    /// Replaces the derived bounding box with an explicit one
    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Result<Self, GeometryError> {
        if !bounding_box.encloses(&self.points) {
            return Err(GeometryError::BoundingBoxMismatch {
                identifier: self.identifier,
            });
        }
        self.bounding_box = bounding_box;
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Re-checks the structural invariants
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.identifier.is_empty() {
            return Err(GeometryError::EmptyIdentifier);
        }
        if self.points.len() < 3 {
            return Err(GeometryError::TooFewPoints {
                identifier: self.identifier.clone(),
                count: self.points.len(),
            });
        }
        if !self.bounding_box.encloses(&self.points) {
            return Err(GeometryError::BoundingBoxMismatch {
                identifier: self.identifier.clone(),
            });
        }
        Ok(())
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn floor(&self) -> Option<&Floor> {
        self.floor.as_ref()
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Clockwise polygon vertices
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Hit test ignoring floors; the bounding box is the fast reject
    pub fn contains_coordinate(&self, coordinate: &Coordinate) -> bool {
        self.bounding_box.contains(coordinate) && geometry::polygon_contains(&self.points, coordinate)
    }

    /// A geofence bound to a floor only matches locations on that floor
    pub fn matches_floor(&self, location: &Location) -> bool {
        match (&self.floor, &location.floor) {
            (None, _) => true,
            (Some(fence), Some(at)) => fence.same_level(at),
            (Some(_), None) => false,
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.matches_floor(location) && self.contains_coordinate(&location.coordinate)
    }
}

impl TryFrom<GeofenceDefinition> for Geofence {
    type Error = GeometryError;

    fn try_from(def: GeofenceDefinition) -> Result<Self, Self::Error> {
        let mut geofence = Geofence::polygon(def.identifier, def.floor, def.points)?;
        if let Some(bbox) = def.bounding_box {
            geofence = geofence.with_bounding_box(bbox)?;
        }
        geofence.name = def.name;
        Ok(geofence)
    }
}

impl From<Geofence> for GeofenceDefinition {
    fn from(geofence: Geofence) -> Self {
        Self {
            identifier: geofence.identifier,
            name: geofence.name,
            floor: geofence.floor,
            bounding_box: Some(geofence.bounding_box),
            points: geofence.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_points() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(10.0, 10.0),
            Coordinate::new(10.0, 0.0),
        ]
    }

    #[test]
    fn test_square_containment() {
        let fence = Geofence::polygon("G1", None, square_points()).unwrap();
        let at = |lat, lon| Location::new(Coordinate::new(lat, lon), 1.0, 0);

        assert!(fence.contains(&at(5.0, 5.0)));
        assert!(!fence.contains(&at(15.0, 15.0)));
        assert!(fence.contains(&at(0.0, 5.0)));
        assert!(fence.contains(&at(10.0, 0.0)));
    }

    #[test]
    fn test_too_few_points_rejected() {
        let err = Geofence::polygon(
            "tiny",
            None,
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::TooFewPoints { identifier: "tiny".into(), count: 2 });
    }

    #[test]
    fn test_closing_and_repeated_points_collapsed() {
        let mut points = square_points();
        points.insert(1, Coordinate::new(0.0, 0.0));
        points.push(Coordinate::new(0.0, 0.0));
        let fence = Geofence::polygon("G1", None, points).unwrap();
        assert_eq!(fence.points().len(), 4);

        let err = Geofence::polygon(
            "closed-triangle",
            None,
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0), Coordinate::new(0.0, 0.0)],
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::TooFewPoints { count: 2, .. }));
    }

    #[test]
    fn test_stored_ring_is_clockwise() {
        let fence = Geofence::polygon("G1", None, square_points()).unwrap();
        assert!(geometry::signed_area2(fence.points()) < 0.0);

        let clockwise: Vec<_> = square_points().into_iter().rev().collect();
        let fence = Geofence::polygon("G2", None, clockwise.clone()).unwrap();
        assert_eq!(fence.points(), clockwise.as_slice());
    }

    #[test]
    fn test_collinear_points_rejected() {
        let err = Geofence::polygon(
            "line",
            None,
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)],
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::DegenerateArea { .. }));
    }

    #[test]
    fn test_explicit_bounding_box_must_enclose() {
        let fence = Geofence::polygon("G1", None, square_points()).unwrap();
        let small = BoundingBox::from_corners(Coordinate::new(0.0, 0.0), Coordinate::new(5.0, 5.0));
        assert!(matches!(
            fence.clone().with_bounding_box(small),
            Err(GeometryError::BoundingBoxMismatch { .. })
        ));

        let large = BoundingBox::from_corners(Coordinate::new(-1.0, -1.0), Coordinate::new(11.0, 11.0));
        let fence = fence.with_bounding_box(large).unwrap();
        assert_eq!(fence.bounding_box(), &large);
    }

    #[test]
    fn test_flat_edges() {
        let fence = Geofence::from_flat_edges("flat", None, &[0.0, 0.0, 0.0, 10.0, 10.0, 10.0]).unwrap();
        assert_eq!(fence.points().len(), 3);

        let err = Geofence::from_flat_edges("odd", None, &[0.0, 0.0, 1.0]).unwrap_err();
        assert_eq!(err, GeometryError::OddEdgeList { identifier: "odd".into(), len: 3 });
    }

    #[test]
    fn test_floor_filter() {
        let fence = Geofence::polygon("G1", Some(Floor::new(2)), square_points()).unwrap();
        let base = Location::new(Coordinate::new(5.0, 5.0), 1.0, 0);

        assert!(!fence.contains(&base));
        assert!(!fence.contains(&base.clone().with_floor(Floor::new(1))));
        assert!(fence.contains(&base.with_floor(Floor::new(2).with_certainty(0.4))));
    }

    #[test]
    fn test_deserialization_validates() {
        let json = r#"{"identifier": "bad", "points": [{"latitude": 0.0, "longitude": 0.0}]}"#;
        assert!(serde_json::from_str::<Geofence>(json).is_err());

        let fence = Geofence::polygon("G1", None, square_points()).unwrap().with_name("Lobby");
        let encoded = serde_json::to_string(&fence).unwrap();
        let decoded: Geofence = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, fence);
    }
}

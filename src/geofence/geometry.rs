//! Planar geometry helpers for geofence hit testing.
//!
//! Coordinates are treated as points on a plane with longitude as x and
//! latitude as y. Geofences are building-sized, so no projection is applied.
//! Boundaries are inclusive for both the bounding box and the polygon.

use crate::core::constants::GEOMETRY_EPSILON;
use crate::core::Coordinate;
use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its south-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl BoundingBox {
    /// Builds a box from any two opposite corners
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        Self {
            min: Coordinate::new(a.latitude.min(b.latitude), a.longitude.min(b.longitude)),
            max: Coordinate::new(a.latitude.max(b.latitude), a.longitude.max(b.longitude)),
        }
    }

    /// Smallest box covering every point, `None` for an empty slice
    pub fn enclosing(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self { min: *first, max: *first };
        for p in &points[1..] {
            bbox.min.latitude = bbox.min.latitude.min(p.latitude);
            bbox.min.longitude = bbox.min.longitude.min(p.longitude);
            bbox.max.latitude = bbox.max.latitude.max(p.latitude);
            bbox.max.longitude = bbox.max.longitude.max(p.longitude);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &Coordinate) -> bool {
        p.latitude >= self.min.latitude - GEOMETRY_EPSILON
            && p.latitude <= self.max.latitude + GEOMETRY_EPSILON
            && p.longitude >= self.min.longitude - GEOMETRY_EPSILON
            && p.longitude <= self.max.longitude + GEOMETRY_EPSILON
    }

    pub fn encloses(&self, points: &[Coordinate]) -> bool {
        points.iter().all(|p| self.contains(p))
    }
}

/// Twice the signed shoelace area; positive for counter-clockwise rings
pub fn signed_area2(points: &[Coordinate]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = &points[i];
            let b = &points[(i + 1) % n];
            a.longitude * b.latitude - b.longitude * a.latitude
        })
        .sum()
}

/// Inclusive point-in-polygon test (even-odd ray casting).
///
/// Points lying on an edge or vertex are inside.
pub fn polygon_contains(points: &[Coordinate], p: &Coordinate) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }

    let (px, py) = (p.longitude, p.latitude);
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (points[i].longitude, points[i].latitude);
        let (xj, yj) = (points[j].longitude, points[j].latitude);

        if on_segment((xj, yj), (xi, yi), (px, py)) {
            return true;
        }
        if (yi > py) != (yj > py) {
            let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let cross = dx * (p.1 - a.1) - dy * (p.0 - a.0);
    let length = (dx * dx + dy * dy).sqrt();
    if cross.abs() > GEOMETRY_EPSILON * length.max(1.0) {
        return false;
    }
    p.0 >= a.0.min(b.0) - GEOMETRY_EPSILON
        && p.0 <= a.0.max(b.0) + GEOMETRY_EPSILON
        && p.1 >= a.1.min(b.1) - GEOMETRY_EPSILON
        && p.1 <= a.1.max(b.1) + GEOMETRY_EPSILON
}

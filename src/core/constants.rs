//! Physical constants and default thresholds

/// Mean Earth radius used for horizontal displacement (m)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Minimum horizontal movement before a new location is reported (m)
pub const DEFAULT_DISTANCE_FILTER_M: f64 = 0.7;

/// Minimum heading change before a new heading is reported (degrees)
pub const DEFAULT_HEADING_FILTER_DEG: f64 = 1.0;

/// Minimum orientation change before a new attitude is reported (degrees)
pub const DEFAULT_ATTITUDE_FILTER_DEG: f64 = 1.0;

/// Number of observer failures retained for diagnostics
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 64;

/// Quaternions shorter than this cannot be normalised into an attitude
pub const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Tolerance for on-edge and bounding box tests (degrees)
pub const GEOMETRY_EPSILON: f64 = 1e-12;

/// Well-known extra info key carrying the positioning trace identifier
pub const TRACE_ID_KEY: &str = "traceId";

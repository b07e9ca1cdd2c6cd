//! Indoor Positioning Event Bridge
//!
//! Receives fixes, sensor samples, calibration and status values from an
//! opaque positioning producer and delivers them, in order and exactly once,
//! to registered observers. Along the way it applies the distance, heading
//! and attitude change filters and turns location updates into enter/exit
//! transitions for monitored geofences.

pub mod api;
pub mod core;
pub mod dispatch;
pub mod geofence;
pub mod logging;
pub mod producer;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    AccuracyMode, Attitude, CalibrationQuality, Coordinate, ExtraInfo, Floor, Heading, Location, Region,
    RegionKind, RegionType, Status, TRACE_ID_KEY,
};
pub use api::{BridgeError, BridgeResult, BridgeStats, EventSink, LocationHint, LocationManager};
pub use dispatch::{CallbackObserver, LocationObserver, ObserverError, ObserverFailure, ObserverHandle, ObserverResult};
pub use geofence::{BoundingBox, Geofence, GeofenceRegistry, GeometryError};
pub use producer::{
    MockProducer, PositioningProducer, ProducerError, ProducerEvent, RawFix, ReplayProducer, Scenario,
};
pub use session::{FilterThresholds, SessionState};
pub use utils::{ApiCredentials, BridgeConfig, ConfigError};

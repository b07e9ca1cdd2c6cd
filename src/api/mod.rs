//! Public bridge API
//!
//! [`LocationManager`] is the entry point: it owns the session, the monitored
//! geofences and the observers, and accepts producer input through an
//! [`EventSink`].

pub mod manager;
pub mod shared;
pub mod types;

pub use manager::{EventSink, LocationManager};
pub use types::{BridgeError, BridgeResult, BridgeStats, LocationHint};

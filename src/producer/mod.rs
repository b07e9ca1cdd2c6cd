//! Positioning producer abstraction.
//!
//! A producer is the opaque source of fixes and sensor samples. The bridge
//! starts and stops it and hands it an [`EventSink`] to push into.

pub mod error;
pub mod mock;
pub mod replay;

pub use error::{ProducerError, ProducerResult};
pub use mock::{MockHandle, MockProducer};
pub use replay::{ReplayInput, ReplayMonitor, ReplayProducer, ReplayStep, Scenario};

use crate::api::types::LocationHint;
use crate::api::EventSink;
use crate::core::{
    AccuracyMode, Attitude, CalibrationQuality, Coordinate, ExtraInfo, Floor, Heading, Location, Region, Status,
};
use crate::utils::config::ApiCredentials;
use serde::{Deserialize, Serialize};

/// One raw position observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub coordinate: Coordinate,
    /// Radius of uncertainty (m)
    pub accuracy_m: f64,
    #[serde(default)]
    pub floor: Option<Floor>,
    /// Floor plan or venue the producer matched the fix to
    #[serde(default)]
    pub region: Option<Region>,
    pub timestamp_ms: u64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
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

    /// Validates the fix and converts it into a location
    pub fn into_location(self) -> ProducerResult<Location> {
        if !self.coordinate.is_valid() {
            return Err(ProducerError::InvalidSample {
                reason: format!(
                    "coordinate ({}, {}) is out of range",
                    self.coordinate.latitude, self.coordinate.longitude
                ),
            });
        }
        if !self.accuracy_m.is_finite() || self.accuracy_m < 0.0 {
            return Err(ProducerError::InvalidSample {
                reason: format!("accuracy {} must be finite and non-negative", self.accuracy_m),
            });
        }
        Ok(Location {
            coordinate: self.coordinate,
            accuracy_m: self.accuracy_m,
            floor: self.floor,
            region: self.region,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

/// Input pushed by a producer
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    /// Fixes batched before delivery, oldest first
    Fixes(Vec<RawFix>),
    Heading(Heading),
    Attitude(Attitude),
    Calibration(CalibrationQuality),
    Status(Status),
    ExtraInfo(ExtraInfo),
}

impl ProducerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProducerEvent::Fixes(_) => "fixes",
            ProducerEvent::Heading(_) => "heading",
            ProducerEvent::Attitude(_) => "attitude",
            ProducerEvent::Calibration(_) => "calibration",
            ProducerEvent::Status(_) => "status",
            ProducerEvent::ExtraInfo(_) => "extra_info",
        }
    }
}

/// Source of positioning samples.
///
/// `start` must return before the producer pushes anything into the sink;
/// samples are delivered from the producer's own thread or by the host.
pub trait PositioningProducer: Send {
    /// Short name used in logs
    fn name(&self) -> &str {
        "producer"
    }

    /// Begins delivering samples into `sink`
    fn start(&mut self, sink: EventSink) -> ProducerResult<()>;

    /// Stops delivering samples; must be safe to call when not started
    fn stop(&mut self);

    fn set_desired_accuracy(&mut self, _mode: AccuracyMode) {}

    /// Explicit position input from the host application
    fn apply_hint(&mut self, _hint: &LocationHint) {}

    fn authenticate(&mut self, _credentials: &ApiCredentials) -> ProducerResult<()> {
        Ok(())
    }
}

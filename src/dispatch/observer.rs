//! Observer interface for bridge events.
//!
//! Every callback is optional. Implement [`LocationObserver`] for the ones you
//! need, or assemble a [`CallbackObserver`] from closures.

use crate::core::{Attitude, CalibrationQuality, ExtraInfo, Heading, Location, Region, Status};
use thiserror::Error;

/// Failure reported by an observer callback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ObserverError {
    message: String,
}

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ObserverError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ObserverError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

pub type ObserverResult = Result<(), ObserverError>;

/// Receiver of bridge events.
///
/// Callbacks run synchronously on the thread driving the bridge. An error or
/// panic is isolated to this observer and this event.
pub trait LocationObserver: Send + Sync {
    /// New locations, oldest first; never empty
    fn on_locations(&self, _locations: &[Location]) -> ObserverResult {
        Ok(())
    }

    fn on_enter_region(&self, _region: &Region) -> ObserverResult {
        Ok(())
    }

    fn on_exit_region(&self, _region: &Region) -> ObserverResult {
        Ok(())
    }

    fn on_status_changed(&self, _status: Status) -> ObserverResult {
        Ok(())
    }

    fn on_calibration_changed(&self, _quality: CalibrationQuality) -> ObserverResult {
        Ok(())
    }

    fn on_extra_info(&self, _info: &ExtraInfo) -> ObserverResult {
        Ok(())
    }

    fn on_heading_updated(&self, _heading: &Heading) -> ObserverResult {
        Ok(())
    }

    fn on_attitude_updated(&self, _attitude: &Attitude) -> ObserverResult {
        Ok(())
    }
}

/// Callback function type for location batches
pub type LocationsCallback = Box<dyn Fn(&[Location]) + Send + Sync>;

/// Callback function type for region transitions
pub type RegionCallback = Box<dyn Fn(&Region) + Send + Sync>;

/// Observer built from optional closures
#[derive(Default)]
pub struct CallbackObserver {
    locations: Option<LocationsCallback>,
    enter_region: Option<RegionCallback>,
    exit_region: Option<RegionCallback>,
    status: Option<Box<dyn Fn(Status) + Send + Sync>>,
    calibration: Option<Box<dyn Fn(CalibrationQuality) + Send + Sync>>,
    extra_info: Option<Box<dyn Fn(&ExtraInfo) + Send + Sync>>,
    heading: Option<Box<dyn Fn(&Heading) + Send + Sync>>,
    attitude: Option<Box<dyn Fn(&Attitude) + Send + Sync>>,
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locations(mut self, f: impl Fn(&[Location]) + Send + Sync + 'static) -> Self {
        self.locations = Some(Box::new(f));
        self
    }

    pub fn with_enter_region(mut self, f: impl Fn(&Region) + Send + Sync + 'static) -> Self {
        self.enter_region = Some(Box::new(f));
        self
    }

    pub fn with_exit_region(mut self, f: impl Fn(&Region) + Send + Sync + 'static) -> Self {
        self.exit_region = Some(Box::new(f));
        self
    }

    pub fn with_status(mut self, f: impl Fn(Status) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }

    pub fn with_calibration(mut self, f: impl Fn(CalibrationQuality) + Send + Sync + 'static) -> Self {
        self.calibration = Some(Box::new(f));
        self
    }

    pub fn with_extra_info(mut self, f: impl Fn(&ExtraInfo) + Send + Sync + 'static) -> Self {
        self.extra_info = Some(Box::new(f));
        self
    }

    pub fn with_heading(mut self, f: impl Fn(&Heading) + Send + Sync + 'static) -> Self {
        self.heading = Some(Box::new(f));
        self
    }

    pub fn with_attitude(mut self, f: impl Fn(&Attitude) + Send + Sync + 'static) -> Self {
        self.attitude = Some(Box::new(f));
        self
    }
}

impl LocationObserver for CallbackObserver {
    fn on_locations(&self, locations: &[Location]) -> ObserverResult {
        if let Some(callback) = &self.locations {
            callback(locations);
        }
        Ok(())
    }

    fn on_enter_region(&self, region: &Region) -> ObserverResult {
        if let Some(callback) = &self.enter_region {
            callback(region);
        }
        Ok(())
    }

    fn on_exit_region(&self, region: &Region) -> ObserverResult {
        if let Some(callback) = &self.exit_region {
            callback(region);
        }
        Ok(())
    }

    fn on_status_changed(&self, status: Status) -> ObserverResult {
        if let Some(callback) = &self.status {
            callback(status);
        }
        Ok(())
    }

    fn on_calibration_changed(&self, quality: CalibrationQuality) -> ObserverResult {
        if let Some(callback) = &self.calibration {
            callback(quality);
        }
        Ok(())
    }

    fn on_extra_info(&self, info: &ExtraInfo) -> ObserverResult {
        if let Some(callback) = &self.extra_info {
            callback(info);
        }
        Ok(())
    }

    fn on_heading_updated(&self, heading: &Heading) -> ObserverResult {
        if let Some(callback) = &self.heading {
            callback(heading);
        }
        Ok(())
    }

    fn on_attitude_updated(&self, attitude: &Attitude) -> ObserverResult {
        if let Some(callback) = &self.attitude {
            callback(attitude);
        }
        Ok(())
    }
}

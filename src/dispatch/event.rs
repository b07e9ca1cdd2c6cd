//! Events delivered to observers

use crate::core::{Attitude, CalibrationQuality, ExtraInfo, Heading, Location, Region, Status};
use crate::dispatch::observer::{LocationObserver, ObserverResult};
use serde::Serialize;
use std::fmt;

/// One observer notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum BridgeEvent {
    /// Accepted fixes, oldest first
    Locations(Vec<Location>),
    EnterRegion(Region),
    ExitRegion(Region),
    StatusChanged(Status),
    CalibrationChanged(CalibrationQuality),
    ExtraInfo(ExtraInfo),
    Heading(Heading),
    Attitude(Attitude),
}

/// Event discriminant, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Locations,
    EnterRegion,
    ExitRegion,
    StatusChanged,
    CalibrationChanged,
    ExtraInfo,
    Heading,
    Attitude,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Locations => "locations",
            EventKind::EnterRegion => "enter-region",
            EventKind::ExitRegion => "exit-region",
            EventKind::StatusChanged => "status-changed",
            EventKind::CalibrationChanged => "calibration-changed",
            EventKind::ExtraInfo => "extra-info",
            EventKind::Heading => "heading",
            EventKind::Attitude => "attitude",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::Locations(_) => EventKind::Locations,
            BridgeEvent::EnterRegion(_) => EventKind::EnterRegion,
            BridgeEvent::ExitRegion(_) => EventKind::ExitRegion,
            BridgeEvent::StatusChanged(_) => EventKind::StatusChanged,
            BridgeEvent::CalibrationChanged(_) => EventKind::CalibrationChanged,
            BridgeEvent::ExtraInfo(_) => EventKind::ExtraInfo,
            BridgeEvent::Heading(_) => EventKind::Heading,
            BridgeEvent::Attitude(_) => EventKind::Attitude,
        }
    }

    /// Invokes the matching observer callback
    pub fn deliver(&self, observer: &dyn LocationObserver) -> ObserverResult {
        match self {
            BridgeEvent::Locations(locations) => observer.on_locations(locations),
            BridgeEvent::EnterRegion(region) => observer.on_enter_region(region),
            BridgeEvent::ExitRegion(region) => observer.on_exit_region(region),
            BridgeEvent::StatusChanged(status) => observer.on_status_changed(*status),
            BridgeEvent::CalibrationChanged(quality) => observer.on_calibration_changed(*quality),
            BridgeEvent::ExtraInfo(info) => observer.on_extra_info(info),
            BridgeEvent::Heading(heading) => observer.on_heading_updated(heading),
            BridgeEvent::Attitude(attitude) => observer.on_attitude_updated(attitude),
        }
    }
}

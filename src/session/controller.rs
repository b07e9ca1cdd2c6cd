//! Session state machine and last-known snapshots.
//!
//! The controller decides which producer samples are reported. It owns the
//! `Stopped`/`Started` lifecycle, the three change filters and the last value
//! of every stream. Snapshots survive a stop; only a new `start` re-arms the
//! initial sample guarantee.

use crate::api::types::LocationHint;
use crate::core::{
    AccuracyMode, Attitude, CalibrationQuality, ExtraInfo, Heading, Location, Status,
};
use crate::session::filter::{EmissionGate, FilterThresholds};
use crate::utils::config::ConfigError;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Stopped,
    Started,
}

/// Per-stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub sessions_started: u64,
    pub fixes_received: u64,
    pub fixes_emitted: u64,
    pub fixes_suppressed: u64,
    /// Fixes older than the last emitted one
    pub fixes_stale: u64,
    pub headings_emitted: u64,
    pub headings_suppressed: u64,
    pub attitudes_emitted: u64,
    pub attitudes_suppressed: u64,
    /// Inputs of any kind that arrived while stopped
    pub inputs_discarded: u64,
}

/// Lifecycle, filtering and snapshots for one positioning session
#[derive(Debug, Clone)]
pub struct SessionController {
    state: SessionState,
    thresholds: FilterThresholds,
    desired_accuracy: AccuracyMode,
    location_gate: EmissionGate<Location>,
    heading_gate: EmissionGate<Heading>,
    attitude_gate: EmissionGate<Attitude>,
    last_calibration: Option<CalibrationQuality>,
    last_status: Option<Status>,
    last_extra_info: Option<ExtraInfo>,
    hint: Option<LocationHint>,
    stats: SessionStats,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(FilterThresholds::default(), AccuracyMode::default())
    }
}

impl SessionController {
    pub fn new(thresholds: FilterThresholds, desired_accuracy: AccuracyMode) -> Self {
        Self {
            state: SessionState::Stopped,
            thresholds,
            desired_accuracy,
            location_gate: EmissionGate::default(),
            heading_gate: EmissionGate::default(),
            attitude_gate: EmissionGate::default(),
            last_calibration: None,
            last_status: None,
            last_extra_info: None,
            hint: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == SessionState::Started
    }

    /// Starts the session; returns false when it was already running.
    ///
    /// A redundant start keeps the filters as they are, so it does not force
    /// a new initial fix.
    pub fn start(&mut self) -> bool {
        if self.is_started() {
            debug!("Session already started");
            return false;
        }
        self.state = SessionState::Started;
        self.location_gate.arm();
        self.heading_gate.arm();
        self.attitude_gate.arm();
        self.stats.sessions_started += 1;
        info!(session = self.stats.sessions_started, accuracy = ?self.desired_accuracy, "Session started");
        true
    }

    /// Stops the session; returns false when it was not running
    pub fn stop(&mut self) -> bool {
        if !self.is_started() {
            debug!("Session already stopped");
            return false;
        }
        self.state = SessionState::Stopped;
        info!(session = self.stats.sessions_started, "Session stopped");
        true
    }

    fn admit_input(&mut self, kind: &'static str) -> bool {
        if self.is_started() {
            return true;
        }
        self.record_discarded(kind);
        false
    }

    /// Counts an input dropped because the session is stopped
    pub fn record_discarded(&mut self, kind: &'static str) {
        self.stats.inputs_discarded += 1;
        trace!(kind, "Discarding input received while stopped");
    }

    /// Applies the filters to a raw fix; `Some` when the fix is to be reported
    pub fn accept_fix(&mut self, location: Location) -> Option<Location> {
        if !self.admit_input("fix") {
            return None;
        }
        self.stats.fixes_received += 1;
        let location = self.apply_hint_context(location);

        if !self.location_gate.is_armed() {
            if let Some(last) = self.location_gate.reference() {
                if location.timestamp_ms < last.timestamp_ms {
                    self.stats.fixes_stale += 1;
                    warn!(
                        timestamp_ms = location.timestamp_ms,
                        last_ms = last.timestamp_ms,
                        "Dropping fix older than the last reported one"
                    );
                    return None;
                }
            }
        }

        let threshold = self.thresholds.distance_m;
        if self
            .location_gate
            .admit(&location, threshold, |last, next| next.displacement_from(last))
        {
            self.stats.fixes_emitted += 1;
            Some(location)
        } else {
            self.stats.fixes_suppressed += 1;
            debug!(threshold_m = threshold, "Fix suppressed by distance filter");
            None
        }
    }

    pub fn accept_heading(&mut self, heading: Heading) -> Option<Heading> {
        if !self.admit_input("heading") {
            return None;
        }
        if self
            .heading_gate
            .admit(&heading, self.thresholds.heading_deg, |last, next| next.delta_deg(last))
        {
            self.stats.headings_emitted += 1;
            Some(heading)
        } else {
            self.stats.headings_suppressed += 1;
            None
        }
    }

    pub fn accept_attitude(&mut self, attitude: Attitude) -> Option<Attitude> {
        if !self.admit_input("attitude") {
            return None;
        }
        if self
            .attitude_gate
            .admit(&attitude, self.thresholds.attitude_deg, |last, next| next.delta_deg(last))
        {
            self.stats.attitudes_emitted += 1;
            Some(attitude)
        } else {
            self.stats.attitudes_suppressed += 1;
            None
        }
    }

    /// Stores the quality; true when it differs from the stored value
    pub fn observe_calibration(&mut self, quality: CalibrationQuality) -> bool {
        if !self.admit_input("calibration") {
            return false;
        }
        if self.last_calibration == Some(quality) {
            return false;
        }
        debug!(from = ?self.last_calibration, to = ?quality, "Calibration quality changed");
        self.last_calibration = Some(quality);
        true
    }

    /// Stores the status; every status received while started is reported
    pub fn observe_status(&mut self, status: Status) -> bool {
        if !self.admit_input("status") {
            return false;
        }
        if self.last_status != Some(status) {
            info!(status = ?status, code = status.code(), "Positioning status changed");
        }
        self.last_status = Some(status);
        true
    }

    pub fn observe_extra_info(&mut self, info: &ExtraInfo) -> bool {
        if !self.admit_input("extra_info") {
            return false;
        }
        self.last_extra_info = Some(info.clone());
        true
    }

    /// Fills in region and floor from a locking hint
    fn apply_hint_context(&self, mut location: Location) -> Location {
        if let Some(hint) = &self.hint {
            if location.region.is_none() {
                location.region = hint
                    .locked_region()
                    .map(|region| region.with_timestamp(location.timestamp_ms));
            }
            if location.floor.is_none() {
                location.floor = hint.locked_floor();
            }
        }
        location
    }

    pub fn set_hint(&mut self, hint: LocationHint) {
        debug!(hint = ?hint, "Location hint set");
        self.hint = Some(hint);
    }

    pub fn clear_hint(&mut self) {
        self.hint = None;
    }

    pub fn hint(&self) -> Option<&LocationHint> {
        self.hint.as_ref()
    }

    pub fn thresholds(&self) -> FilterThresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: FilterThresholds) -> Result<(), ConfigError> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn set_distance_filter(&mut self, meters: f64) -> Result<(), ConfigError> {
        self.set_thresholds(FilterThresholds { distance_m: meters, ..self.thresholds })
    }

    pub fn set_heading_filter(&mut self, degrees: f64) -> Result<(), ConfigError> {
        self.set_thresholds(FilterThresholds { heading_deg: degrees, ..self.thresholds })
    }

    pub fn set_attitude_filter(&mut self, degrees: f64) -> Result<(), ConfigError> {
        self.set_thresholds(FilterThresholds { attitude_deg: degrees, ..self.thresholds })
    }

    pub fn desired_accuracy(&self) -> AccuracyMode {
        self.desired_accuracy
    }

    pub fn set_desired_accuracy(&mut self, mode: AccuracyMode) {
        self.desired_accuracy = mode;
    }

    pub fn last_location(&self) -> Option<&Location> {
        self.location_gate.reference()
    }

    pub fn last_heading(&self) -> Option<&Heading> {
        self.heading_gate.reference()
    }

    pub fn last_attitude(&self) -> Option<&Attitude> {
        self.attitude_gate.reference()
    }

    pub fn last_calibration(&self) -> Option<CalibrationQuality> {
        self.last_calibration
    }

    pub fn last_status(&self) -> Option<Status> {
        self.last_status
    }

    pub fn last_extra_info(&self) -> Option<&ExtraInfo> {
        self.last_extra_info.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

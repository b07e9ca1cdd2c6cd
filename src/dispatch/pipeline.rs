//! Serialized producer-to-event pipeline.
//!
//! Everything that mutates bridge state for an input (filters, snapshots,
//! region membership) happens here, one input at a time.

use crate::core::Location;
use crate::dispatch::dispatcher::EventDispatcher;
use crate::dispatch::event::BridgeEvent;
use crate::geofence::GeofenceRegistry;
use crate::producer::ProducerEvent;
use crate::session::SessionController;
use crate::utils::config::BridgeConfig;
use std::collections::VecDeque;
use tracing::warn;

/// Session, geofences and region tracking behind a single owner
#[derive(Debug)]
pub struct BridgePipeline {
    session: SessionController,
    registry: GeofenceRegistry,
    dispatcher: EventDispatcher,
    queue: VecDeque<ProducerEvent>,
}

impl BridgePipeline {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            session: SessionController::new(config.thresholds(), config.desired_accuracy),
            registry: GeofenceRegistry::new(),
            dispatcher: EventDispatcher::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn start(&mut self) -> bool {
        self.session.start()
    }

    /// Stops the session and drops everything still queued
    pub fn stop(&mut self) -> bool {
        let stopped = self.session.stop();
        for event in self.queue.drain(..) {
            self.session.record_discarded(event.kind());
        }
        stopped
    }

    /// Queues producer input; false when it was discarded because stopped
    pub fn enqueue(&mut self, event: ProducerEvent) -> bool {
        if !self.session.is_started() {
            self.session.record_discarded(event.kind());
            return false;
        }
        self.queue.push_back(event);
        true
    }

    pub fn next_queued(&mut self) -> Option<ProducerEvent> {
        self.queue.pop_front()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Runs one input through the session filters and region tracking
    pub fn process(&mut self, event: ProducerEvent) -> Vec<BridgeEvent> {
        match event {
            ProducerEvent::Fixes(fixes) => {
                let mut accepted: Vec<Location> = Vec::with_capacity(fixes.len());
                for fix in fixes {
                    match fix.into_location() {
                        Ok(location) => accepted.extend(self.session.accept_fix(location)),
                        Err(e) => warn!(error = %e, "Dropping invalid fix"),
                    }
                }
                self.dispatcher.location_events(&self.registry, accepted)
            }
            ProducerEvent::Heading(heading) => self
                .session
                .accept_heading(heading)
                .map(BridgeEvent::Heading)
                .into_iter()
                .collect(),
            ProducerEvent::Attitude(attitude) => self
                .session
                .accept_attitude(attitude)
                .map(BridgeEvent::Attitude)
                .into_iter()
                .collect(),
            ProducerEvent::Calibration(quality) => {
                if self.session.observe_calibration(quality) {
                    vec![BridgeEvent::CalibrationChanged(quality)]
                } else {
                    Vec::new()
                }
            }
            ProducerEvent::Status(status) => {
                if self.session.observe_status(status) {
                    vec![BridgeEvent::StatusChanged(status)]
                } else {
                    Vec::new()
                }
            }
            ProducerEvent::ExtraInfo(info) => {
                if self.session.observe_extra_info(&info) {
                    vec![BridgeEvent::ExtraInfo(info)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Keeps region membership in line with what observers were told
    pub fn revert_undelivered(&mut self, undelivered: &[BridgeEvent]) {
        self.dispatcher.revert_undelivered(undelivered);
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionController {
        &mut self.session
    }

    pub fn registry(&self) -> &GeofenceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut GeofenceRegistry {
        &mut self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

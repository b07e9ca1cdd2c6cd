//! Event construction and fan-out

use crate::core::Location;
use crate::dispatch::diagnostics::{DiagnosticsLog, ObserverFailure};
use crate::dispatch::event::BridgeEvent;
use crate::dispatch::observers::ObserverEntry;
use crate::dispatch::transitions::RegionTracker;
use crate::geofence::GeofenceRegistry;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace};

/// Builds location and region events and delivers them to observers
#[derive(Debug, Default)]
pub struct EventDispatcher {
    tracker: RegionTracker,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for one batch of accepted fixes.
    ///
    /// A single `Locations` event carries the whole batch in input order,
    /// followed by the region transitions of each fix in the same order.
    pub fn location_events(&mut self, registry: &GeofenceRegistry, accepted: Vec<Location>) -> Vec<BridgeEvent> {
        if accepted.is_empty() {
            return Vec::new();
        }
        let transitions: Vec<BridgeEvent> = accepted
            .iter()
            .flat_map(|location| self.tracker.update(registry, location))
            .collect();

        let mut events = Vec::with_capacity(transitions.len() + 1);
        events.push(BridgeEvent::Locations(accepted));
        events.extend(transitions);
        events
    }

    /// Rolls region membership back over events dropped by a cancelled cycle
    pub fn revert_undelivered(&mut self, undelivered: &[BridgeEvent]) {
        self.tracker.revert(undelivered);
    }

    pub fn tracker(&self) -> &RegionTracker {
        &self.tracker
    }

    /// Delivers events in order to every observer in the given order.
    ///
    /// A failing or panicking observer is recorded in `diagnostics` and the
    /// remaining observers still receive the event. `is_live` is checked
    /// before every callback; once it returns false the rest of the cycle is
    /// dropped. Returns the number of events delivered to all observers.
    pub fn deliver<F>(
        events: &[BridgeEvent],
        observers: &[ObserverEntry],
        diagnostics: &Mutex<DiagnosticsLog>,
        is_live: F,
    ) -> usize
    where
        F: Fn() -> bool,
    {
        for (index, event) in events.iter().enumerate() {
            trace!(event = %event.kind(), observers = observers.len(), "Dispatching event");
            for (handle, observer) in observers {
                if !is_live() {
                    let cancelled = events.len() - index;
                    debug!(cancelled, "Session stopped during dispatch; dropping remaining events");
                    diagnostics.lock().note_cancelled(cancelled);
                    return index;
                }

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.deliver(observer.as_ref())));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some((error.message().to_string(), false)),
                    Err(payload) => Some((panic_message(payload.as_ref()), true)),
                };

                let mut log = diagnostics.lock();
                log.note_invocation();
                if let Some((message, panicked)) = failure {
                    log.record_failure(ObserverFailure {
                        observer: *handle,
                        event: event.kind(),
                        message,
                        panicked,
                    });
                }
            }
            diagnostics.lock().note_dispatched();
        }
        events.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "observer panicked".to_string()
    }
}

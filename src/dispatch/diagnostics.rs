//! Diagnostic sink for observer failures

use crate::dispatch::event::EventKind;
use crate::dispatch::observers::ObserverHandle;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

/// One failed observer callback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserverFailure {
    pub observer: ObserverHandle,
    pub event: EventKind,
    pub message: String,
    /// The callback panicked rather than returning an error
    pub panicked: bool,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events delivered to every observer
    pub events_dispatched: u64,
    /// Individual callback invocations
    pub callbacks_invoked: u64,
    pub observer_failures: u64,
    /// Events dropped because the session stopped mid-cycle
    pub events_cancelled: u64,
}

/// Bounded log of observer failures plus delivery counters
#[derive(Debug)]
pub struct DiagnosticsLog {
    capacity: usize,
    failures: VecDeque<ObserverFailure>,
    stats: DispatchStats,
}

impl DiagnosticsLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            failures: VecDeque::with_capacity(capacity),
            stats: DispatchStats::default(),
        }
    }

    /// Logs the failure; the oldest record is dropped once full
    pub fn record_failure(&mut self, failure: ObserverFailure) {
        warn!(
            observer = %failure.observer,
            event = %failure.event,
            panicked = failure.panicked,
            message = %failure.message,
            "Observer callback failed"
        );
        self.stats.observer_failures += 1;
        if self.failures.len() == self.capacity {
            self.failures.pop_front();
        }
        self.failures.push_back(failure);
    }

    pub fn note_invocation(&mut self) {
        self.stats.callbacks_invoked += 1;
    }

    pub fn note_dispatched(&mut self) {
        self.stats.events_dispatched += 1;
    }

    pub fn note_cancelled(&mut self, events: usize) {
        self.stats.events_cancelled += events as u64;
    }

    pub fn failures(&self) -> impl Iterator<Item = &ObserverFailure> {
        self.failures.iter()
    }

    /// Drains the retained failures, oldest first
    pub fn take_failures(&mut self) -> Vec<ObserverFailure> {
        self.failures.drain(..).collect()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Scripted producer for tests and development

use crate::api::types::LocationHint;
use crate::api::EventSink;
use crate::core::AccuracyMode;
use crate::producer::{PositioningProducer, ProducerError, ProducerEvent, ProducerResult, RawFix};
use crate::utils::config::ApiCredentials;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    sink: Option<EventSink>,
    running: bool,
    start_count: u32,
    stop_count: u32,
    hints: Vec<LocationHint>,
    desired_accuracy: Option<AccuracyMode>,
    credentials: Option<ApiCredentials>,
    fail_next_start: Option<String>,
    reject_credentials: bool,
}

/// Test-side view of a [`MockProducer`].
///
/// Events are pushed synchronously on the calling thread, so every observer
/// callback has run by the time `emit` returns.
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Pushes an event into the bridge.
    ///
    /// The sink is kept after `stop`, so this also exercises discard handling.
    /// Returns false before the first start or once the bridge is gone.
    pub fn emit(&self, event: ProducerEvent) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink.push(event),
            None => false,
        }
    }

    pub fn emit_fix(&self, latitude: f64, longitude: f64, accuracy_m: f64, timestamp_ms: u64) -> bool {
        self.emit(ProducerEvent::Fixes(vec![RawFix::new(latitude, longitude, accuracy_m, timestamp_ms)]))
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().start_count
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stop_count
    }

    /// Hints received, oldest first
    pub fn hints(&self) -> Vec<LocationHint> {
        self.state.lock().hints.clone()
    }

    pub fn desired_accuracy(&self) -> Option<AccuracyMode> {
        self.state.lock().desired_accuracy
    }

    pub fn credentials(&self) -> Option<ApiCredentials> {
        self.state.lock().credentials.clone()
    }

    /// Makes the next `start` fail with the given reason
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_start = Some(reason.into());
    }

    pub fn reject_credentials(&self, reject: bool) {
        self.state.lock().reject_credentials = reject;
    }
}

/// Producer driven entirely through its [`MockHandle`]
#[derive(Default)]
pub struct MockProducer {
    handle: MockHandle,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl PositioningProducer for MockProducer {
    fn name(&self) -> &str {
        "mock"
    }

    fn start(&mut self, sink: EventSink) -> ProducerResult<()> {
        let mut state = self.handle.state.lock();
        if let Some(reason) = state.fail_next_start.take() {
            return Err(ProducerError::StartFailed { reason });
        }
        state.sink = Some(sink);
        state.running = true;
        state.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.handle.state.lock();
        if state.running {
            state.running = false;
            state.stop_count += 1;
        }
    }

    fn set_desired_accuracy(&mut self, mode: AccuracyMode) {
        self.handle.state.lock().desired_accuracy = Some(mode);
    }

    fn apply_hint(&mut self, hint: &LocationHint) {
        self.handle.state.lock().hints.push(hint.clone());
    }

    fn authenticate(&mut self, credentials: &ApiCredentials) -> ProducerResult<()> {
        let mut state = self.handle.state.lock();
        if state.reject_credentials {
            return Err(ProducerError::AuthenticationRejected {
                reason: format!("unknown api key '{}'", credentials.api_key),
            });
        }
        state.credentials = Some(credentials.clone());
        Ok(())
    }
}

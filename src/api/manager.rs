//! Location manager: the public entry point of the bridge.
//!
//! Producer input is queued and drained by one thread at a time. That thread
//! runs the whole pipeline for an input (filters, snapshots, region diffing)
//! under the pipeline lock, releases it, and then calls the observers. Observer
//! callbacks may call back into the manager; inputs they push are delivered
//! after the current cycle.

use crate::api::types::{BridgeResult, BridgeStats, LocationHint};
use crate::core::{
    AccuracyMode, Attitude, CalibrationQuality, ExtraInfo, Heading, Location, Status,
};
use crate::dispatch::{
    BridgePipeline, DiagnosticsLog, EventDispatcher, LocationObserver, ObserverFailure, ObserverHandle,
    ObserverRegistry,
};
use crate::geofence::Geofence;
use crate::producer::{PositioningProducer, ProducerEvent, RawFix};
use crate::session::{FilterThresholds, SessionState};
use crate::utils::config::{ApiCredentials, BridgeConfig};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

struct Shared {
    pipeline: Mutex<BridgePipeline>,
    observers: Mutex<ObserverRegistry>,
    diagnostics: Mutex<DiagnosticsLog>,
    /// Held for a whole delivery cycle; the flag marks the pumping thread
    delivery: ReentrantMutex<Cell<bool>>,
    /// Bumped on every start and stop; deliveries from an older session are dropped
    generation: AtomicU64,
    producer: Mutex<Option<Box<dyn PositioningProducer>>>,
    /// Set by a stop issued from a callback; the pump stops the producer once its cycle ends
    producer_stop_pending: AtomicBool,
    /// Detached producers waiting for the current cycle to end before they are stopped
    retired: Mutex<Vec<Box<dyn PositioningProducer>>>,
    credentials: Mutex<Option<ApiCredentials>>,
}

impl Shared {
    /// Drains the input queue, delivering each input's events in order
    fn pump(&self) {
        let pumping = self.delivery.lock();
        if pumping.get() {
            // Pushed from inside a callback; the running loop picks it up
            return;
        }
        pumping.set(true);

        loop {
            let (events, generation) = {
                let mut pipeline = self.pipeline.lock();
                let Some(input) = pipeline.next_queued() else {
                    break;
                };
                let events = pipeline.process(input);
                (events, self.generation.load(Ordering::SeqCst))
            };
            if events.is_empty() {
                continue;
            }

            let observers = self.observers.lock().snapshot();
            let delivered = EventDispatcher::deliver(&events, &observers, &self.diagnostics, || {
                self.generation.load(Ordering::SeqCst) == generation
            });
            if delivered < events.len() {
                self.pipeline.lock().revert_undelivered(&events[delivered..]);
            }
        }

        pumping.set(false);
        drop(pumping);
        self.finish_deferred_stops();
    }

    /// True inside an observer callback on this thread.
    ///
    /// Blocks while another thread is delivering.
    fn on_pumping_thread(&self) -> bool {
        self.delivery.lock().get()
    }

    /// Stops the producer unless a session was started again in the meantime
    fn stop_producer(&self) {
        let mut producer = self.producer.lock();
        if self.pipeline.lock().session().is_started() {
            return;
        }
        if let Some(producer) = producer.as_mut() {
            producer.stop();
        }
    }

    /// Stops a detached producer, or parks it until the running cycle ends
    fn retire_producer(&self, mut producer: Box<dyn PositioningProducer>) {
        if self.on_pumping_thread() {
            self.retired.lock().push(producer);
        } else {
            producer.stop();
        }
    }

    fn finish_deferred_stops(&self) {
        if self.producer_stop_pending.swap(false, Ordering::SeqCst) {
            self.stop_producer();
        }
        let retired = std::mem::take(&mut *self.retired.lock());
        for mut producer in retired {
            producer.stop();
        }
    }
}

/// Handle through which a producer pushes input into the bridge.
///
/// Holds only a weak reference; once every [`LocationManager`] clone is
/// dropped, pushes are refused. Input arriving while the session is stopped
/// is discarded and counted.
#[derive(Clone)]
pub struct EventSink {
    shared: Weak<Shared>,
}

impl EventSink {
    /// Queues and delivers an input; false when it was discarded
    pub fn push(&self, event: ProducerEvent) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let accepted = shared.pipeline.lock().enqueue(event);
        if accepted {
            shared.pump();
        }
        accepted
    }

    pub fn push_fix(&self, fix: RawFix) -> bool {
        self.push(ProducerEvent::Fixes(vec![fix]))
    }

    /// Fixes batched before delivery, oldest first
    pub fn push_fixes(&self, fixes: Vec<RawFix>) -> bool {
        if fixes.is_empty() {
            return false;
        }
        self.push(ProducerEvent::Fixes(fixes))
    }

    pub fn push_heading(&self, degrees: f64, timestamp_ms: u64) -> BridgeResult<bool> {
        let heading = Heading::new(degrees, timestamp_ms)?;
        Ok(self.push(ProducerEvent::Heading(heading)))
    }

    pub fn push_attitude(&self, w: f64, x: f64, y: f64, z: f64, timestamp_ms: u64) -> BridgeResult<bool> {
        let attitude = Attitude::new(w, x, y, z, timestamp_ms)?;
        Ok(self.push(ProducerEvent::Attitude(attitude)))
    }

    pub fn push_calibration(&self, quality: CalibrationQuality) -> bool {
        self.push(ProducerEvent::Calibration(quality))
    }

    pub fn push_status(&self, status: Status) -> bool {
        self.push(ProducerEvent::Status(status))
    }

    pub fn push_extra_info(&self, info: ExtraInfo) -> bool {
        self.push(ProducerEvent::ExtraInfo(info))
    }

    /// False once the bridge has been dropped
    pub fn is_connected(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Indoor positioning bridge.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct LocationManager {
    shared: Arc<Shared>,
}

impl LocationManager {
    /// Creates a stopped bridge with no producer attached
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let shared = Shared {
            pipeline: Mutex::new(BridgePipeline::new(&config)),
            observers: Mutex::new(ObserverRegistry::new()),
            diagnostics: Mutex::new(DiagnosticsLog::new(config.diagnostics_capacity)),
            delivery: ReentrantMutex::new(Cell::new(false)),
            generation: AtomicU64::new(0),
            producer: Mutex::new(None),
            producer_stop_pending: AtomicBool::new(false),
            retired: Mutex::new(Vec::new()),
            credentials: Mutex::new(config.credentials.clone()),
        };
        info!(version = Self::version_string(), "Location manager created");
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn with_producer<P>(config: BridgeConfig, producer: P) -> BridgeResult<Self>
    where
        P: PositioningProducer + 'static,
    {
        let manager = Self::new(config)?;
        manager.attach_producer(producer)?;
        Ok(manager)
    }

    /// Crate version of the bridge
    pub fn version_string() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Installs the producer, replacing and stopping any previous one.
    ///
    /// Stored credentials and the desired accuracy are handed over first. If
    /// a session is running the new producer is started right away.
    pub fn attach_producer<P>(&self, producer: P) -> BridgeResult<()>
    where
        P: PositioningProducer + 'static,
    {
        let mut producer: Box<dyn PositioningProducer> = Box::new(producer);
        let credentials = self.shared.credentials.lock().clone();
        if let Some(credentials) = credentials {
            producer.authenticate(&credentials)?;
        }
        producer.set_desired_accuracy(self.desired_accuracy());
        if self.is_running() {
            producer.start(self.event_sink())?;
        }

        info!(producer = producer.name(), "Producer attached");
        let previous = self.shared.producer.lock().replace(producer);
        if let Some(previous) = previous {
            self.shared.retire_producer(previous);
        }
        Ok(())
    }

    /// Sink for host code that feeds samples without a producer
    pub fn event_sink(&self) -> EventSink {
        EventSink {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn LocationObserver>) -> ObserverHandle {
        let handle = self.shared.observers.lock().add(observer);
        debug!(observer = %handle, "Observer added");
        handle
    }

    /// Removes an observer; a delivery cycle already running still reaches it
    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        let removed = self.shared.observers.lock().remove(handle);
        if removed {
            debug!(observer = %handle, "Observer removed");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }

    /// Starts updating location; a no-op when already running.
    ///
    /// If the producer fails to start the session is rolled back to stopped.
    pub fn start(&self) -> BridgeResult<()> {
        {
            let mut pipeline = self.shared.pipeline.lock();
            if !pipeline.start() {
                return Ok(());
            }
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }

        let accuracy = self.desired_accuracy();
        let mut producer = self.shared.producer.lock();
        if self.shared.producer_stop_pending.swap(false, Ordering::SeqCst) {
            // Stopped and started again within one delivery cycle; the producer never stopped
            if let Some(producer) = producer.as_mut() {
                producer.set_desired_accuracy(accuracy);
            }
            return Ok(());
        }
        if let Some(producer) = producer.as_mut() {
            producer.set_desired_accuracy(accuracy);
            if let Err(e) = producer.start(self.event_sink()) {
                error!(producer = producer.name(), error = %e, "Producer failed to start");
                self.shared.pipeline.lock().stop();
                self.shared.generation.fetch_add(1, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Stops updating location.
    ///
    /// Queued input is discarded, and once this returns no further event is
    /// delivered for the stopped session, including from other threads. When
    /// called from an observer callback the producer itself is stopped after
    /// the current delivery cycle ends.
    pub fn stop(&self) {
        {
            let mut pipeline = self.shared.pipeline.lock();
            if !pipeline.stop() {
                return;
            }
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
        // Waits out a delivery cycle running on another thread
        if self.shared.on_pumping_thread() {
            // Inside a callback; the pump stops the producer once this cycle ends
            debug!("Producer stop deferred to the end of the delivery cycle");
            self.shared.producer_stop_pending.store(true, Ordering::SeqCst);
            return;
        }
        self.shared.stop_producer();
    }

    pub fn is_running(&self) -> bool {
        self.shared.pipeline.lock().session().is_started()
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.pipeline.lock().session().state()
    }

    /// Starts monitoring a geofence, replacing one with the same identifier
    pub fn register_geofence(&self, geofence: Geofence) -> BridgeResult<()> {
        self.shared.pipeline.lock().registry_mut().register(geofence)?;
        Ok(())
    }

    /// Stops monitoring; `None` when the identifier was not monitored
    pub fn unregister_geofence(&self, identifier: &str) -> Option<Arc<Geofence>> {
        self.shared.pipeline.lock().registry_mut().remove(identifier)
    }

    /// Monitored geofences ordered by identifier
    pub fn monitored_geofences(&self) -> Vec<Arc<Geofence>> {
        self.shared.pipeline.lock().registry().snapshot()
    }

    pub fn last_location(&self) -> Option<Location> {
        self.shared.pipeline.lock().session().last_location().cloned()
    }

    pub fn last_heading(&self) -> Option<Heading> {
        self.shared.pipeline.lock().session().last_heading().copied()
    }

    pub fn last_attitude(&self) -> Option<Attitude> {
        self.shared.pipeline.lock().session().last_attitude().copied()
    }

    pub fn last_calibration(&self) -> Option<CalibrationQuality> {
        self.shared.pipeline.lock().session().last_calibration()
    }

    pub fn last_status(&self) -> Option<Status> {
        self.shared.pipeline.lock().session().last_status()
    }

    pub fn last_extra_info(&self) -> Option<ExtraInfo> {
        self.shared.pipeline.lock().session().last_extra_info().cloned()
    }

    /// Passes an explicit position to the producer.
    ///
    /// Floor plan and venue hints also annotate later fixes that arrive
    /// without that context.
    pub fn set_location(&self, hint: LocationHint) {
        self.shared.pipeline.lock().session_mut().set_hint(hint.clone());
        if let Some(producer) = self.shared.producer.lock().as_mut() {
            producer.apply_hint(&hint);
        }
    }

    pub fn clear_location_hint(&self) {
        self.shared.pipeline.lock().session_mut().clear_hint();
    }

    pub fn thresholds(&self) -> FilterThresholds {
        self.shared.pipeline.lock().session().thresholds()
    }

    pub fn distance_filter(&self) -> f64 {
        self.thresholds().distance_m
    }

    pub fn set_distance_filter(&self, meters: f64) -> BridgeResult<()> {
        self.shared.pipeline.lock().session_mut().set_distance_filter(meters)?;
        Ok(())
    }

    pub fn heading_filter(&self) -> f64 {
        self.thresholds().heading_deg
    }

    pub fn set_heading_filter(&self, degrees: f64) -> BridgeResult<()> {
        self.shared.pipeline.lock().session_mut().set_heading_filter(degrees)?;
        Ok(())
    }

    pub fn attitude_filter(&self) -> f64 {
        self.thresholds().attitude_deg
    }

    pub fn set_attitude_filter(&self, degrees: f64) -> BridgeResult<()> {
        self.shared.pipeline.lock().session_mut().set_attitude_filter(degrees)?;
        Ok(())
    }

    pub fn desired_accuracy(&self) -> AccuracyMode {
        self.shared.pipeline.lock().session().desired_accuracy()
    }

    pub fn set_desired_accuracy(&self, mode: AccuracyMode) {
        self.shared.pipeline.lock().session_mut().set_desired_accuracy(mode);
        if let Some(producer) = self.shared.producer.lock().as_mut() {
            producer.set_desired_accuracy(mode);
        }
    }

    /// Stores producer credentials and passes them to the attached producer.
    ///
    /// Credentials the producer rejects are not stored.
    pub fn set_api_key(&self, api_key: impl Into<String>, api_secret: impl Into<String>) -> BridgeResult<()> {
        let credentials = ApiCredentials::new(api_key, api_secret);
        credentials.validate()?;
        if let Some(producer) = self.shared.producer.lock().as_mut() {
            producer.authenticate(&credentials)?;
        }
        info!(api_key = %credentials.api_key, "API key set");
        *self.shared.credentials.lock() = Some(credentials);
        Ok(())
    }

    /// Current settings in configuration form
    pub fn config(&self) -> BridgeConfig {
        let (thresholds, desired_accuracy) = {
            let pipeline = self.shared.pipeline.lock();
            (pipeline.session().thresholds(), pipeline.session().desired_accuracy())
        };
        BridgeConfig {
            distance_filter_m: thresholds.distance_m,
            heading_filter_deg: thresholds.heading_deg,
            attitude_filter_deg: thresholds.attitude_deg,
            desired_accuracy,
            diagnostics_capacity: self.shared.diagnostics.lock().capacity(),
            credentials: self.shared.credentials.lock().clone(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            session: self.shared.pipeline.lock().session().stats(),
            dispatch: self.shared.diagnostics.lock().stats(),
        }
    }

    /// Drains the recorded observer failures, oldest first
    pub fn take_observer_failures(&self) -> Vec<ObserverFailure> {
        self.shared.diagnostics.lock().take_failures()
    }

    /// Stops the session, detaches the producer and drops every observer
    pub fn shutdown(&self) {
        self.stop();
        let producer = self.shared.producer.lock().take();
        if let Some(producer) = producer {
            self.shared.retire_producer(producer);
        }
        self.shared.observers.lock().clear();
        info!("Location manager shut down");
    }
}

impl fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationManager")
            .field("state", &self.session_state())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Coordinate, Floor, Region, RegionType};
    use crate::dispatch::{BridgeEvent, CallbackObserver, ObserverResult};
    use crate::producer::{MockHandle, MockProducer, ProducerError, ReplayProducer, ReplayStep, Scenario};
    use crate::producer::ProducerResult;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, OnceLock};
    use std::thread;
    use std::time::Duration;

    /// Rebuilds every callback into the event it came from
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BridgeEvent>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<BridgeEvent> {
            self.events.lock().clone()
        }

        fn record(&self, event: BridgeEvent) -> ObserverResult {
            self.events.lock().push(event);
            Ok(())
        }

        fn summary(&self) -> Vec<String> {
            self.events()
                .iter()
                .map(|event| match event {
                    BridgeEvent::Locations(l) => format!("locations {}", l.len()),
                    BridgeEvent::EnterRegion(r) => format!("enter {}", r.identifier),
                    BridgeEvent::ExitRegion(r) => format!("exit {}", r.identifier),
                    other => other.kind().to_string(),
                })
                .collect()
        }
    }

    impl LocationObserver for Recorder {
        fn on_locations(&self, locations: &[Location]) -> ObserverResult {
            self.record(BridgeEvent::Locations(locations.to_vec()))
        }

        fn on_enter_region(&self, region: &Region) -> ObserverResult {
            self.record(BridgeEvent::EnterRegion(region.clone()))
        }

        fn on_exit_region(&self, region: &Region) -> ObserverResult {
            self.record(BridgeEvent::ExitRegion(region.clone()))
        }

        fn on_status_changed(&self, status: Status) -> ObserverResult {
            self.record(BridgeEvent::StatusChanged(status))
        }

        fn on_calibration_changed(&self, quality: CalibrationQuality) -> ObserverResult {
            self.record(BridgeEvent::CalibrationChanged(quality))
        }

        fn on_extra_info(&self, info: &ExtraInfo) -> ObserverResult {
            self.record(BridgeEvent::ExtraInfo(info.clone()))
        }

        fn on_heading_updated(&self, heading: &Heading) -> ObserverResult {
            self.record(BridgeEvent::Heading(*heading))
        }

        fn on_attitude_updated(&self, attitude: &Attitude) -> ObserverResult {
            self.record(BridgeEvent::Attitude(*attitude))
        }
    }

    fn square(id: &str, size: f64) -> Geofence {
        Geofence::polygon(
            id,
            None,
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, size),
                Coordinate::new(size, size),
                Coordinate::new(size, 0.0),
            ],
        )
        .unwrap()
    }

    fn mocked() -> (LocationManager, MockHandle, Arc<Recorder>) {
        let producer = MockProducer::new();
        let handle = producer.handle();
        let manager = LocationManager::with_producer(BridgeConfig::default(), producer).unwrap();
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());
        (manager, handle, recorder)
    }

    #[test]
    fn test_first_fix_after_restart_is_emitted() {
        let (manager, mock, recorder) = mocked();
        manager.start().unwrap();
        assert!(mock.emit_fix(60.0, 24.0, 5.0, 1));
        manager.stop();
        manager.start().unwrap();
        assert!(mock.emit_fix(60.0, 24.0, 5.0, 2));

        assert_eq!(recorder.summary(), vec!["locations 1", "locations 1"]);
        assert_eq!(manager.last_location().unwrap().timestamp_ms, 2);
        assert_eq!(mock.start_count(), 2);
        assert_eq!(mock.stop_count(), 1);
    }

    #[test]
    fn test_redundant_start_keeps_filter() {
        let (manager, mock, recorder) = mocked();
        manager.start().unwrap();
        mock.emit_fix(60.0, 24.0, 5.0, 1);
        manager.start().unwrap();
        mock.emit_fix(60.0, 24.0, 5.0, 2);

        assert_eq!(recorder.summary(), vec!["locations 1"]);
        assert_eq!(mock.start_count(), 1);
    }

    #[test]
    fn test_input_discarded_while_stopped() {
        let (manager, mock, recorder) = mocked();
        manager.start().unwrap();
        manager.stop();

        assert!(!mock.emit_fix(60.0, 24.0, 5.0, 1));
        assert!(!mock.emit(ProducerEvent::Status(Status::Available)));
        assert!(recorder.events().is_empty());
        assert_eq!(manager.stats().session.inputs_discarded, 2);
        assert!(manager.last_status().is_none());
    }

    #[test]
    fn test_snapshots_survive_stop() {
        let (manager, mock, _recorder) = mocked();
        manager.start().unwrap();
        mock.emit_fix(60.0, 24.0, 5.0, 1);
        mock.emit(ProducerEvent::Calibration(CalibrationQuality::Good));
        manager.event_sink().push_heading(10.0, 1).unwrap();
        manager.event_sink().push_attitude(1.0, 0.0, 0.0, 0.0, 1).unwrap();
        manager.stop();

        assert!(manager.last_location().is_some());
        assert_eq!(manager.last_heading().unwrap().true_heading_deg, 10.0);
        assert!(manager.last_attitude().is_some());
        assert_eq!(manager.last_calibration(), Some(CalibrationQuality::Good));
    }

    #[test]
    fn test_region_transitions_through_manager() {
        let (manager, mock, recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();
        manager.start().unwrap();

        mock.emit_fix(15.0, 15.0, 5.0, 1);
        mock.emit_fix(5.0, 5.0, 5.0, 2);
        mock.emit_fix(15.0, 15.0, 5.0, 3);

        assert_eq!(
            recorder.summary(),
            vec!["locations 1", "locations 1", "enter G1", "locations 1", "exit G1"]
        );
    }

    #[test]
    fn test_register_replaces_geometry() {
        let (manager, mock, recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();
        manager.register_geofence(square("G1", 2.0)).unwrap();

        let listed = manager.monitored_geofences();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].bounding_box().max, Coordinate::new(2.0, 2.0));

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 5.0, 1);
        assert_eq!(recorder.summary(), vec!["locations 1"]);
    }

    #[test]
    fn test_invalid_geofence_leaves_registry_unchanged() {
        let manager = LocationManager::new(BridgeConfig::default()).unwrap();
        manager.register_geofence(square("G1", 10.0)).unwrap();

        let err = Geofence::from_flat_edges("G2", None, &[0.0, 0.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(
            crate::api::types::BridgeError::from(err),
            crate::api::types::BridgeError::InvalidGeometry(_)
        ));

        assert!(manager.unregister_geofence("missing").is_none());
        assert_eq!(manager.monitored_geofences().len(), 1);
        assert!(manager.unregister_geofence("G1").is_some());
        assert!(manager.monitored_geofences().is_empty());
    }

    #[test]
    fn test_observer_panic_is_isolated() {
        let (manager, mock, recorder) = mocked();
        let bad = manager.add_observer(Arc::new(
            CallbackObserver::new().with_locations(|_| panic!("broken observer")),
        ));
        let after = Arc::new(Recorder::default());
        manager.add_observer(after.clone());

        manager.start().unwrap();
        mock.emit_fix(1.0, 1.0, 1.0, 1);
        mock.emit_fix(2.0, 2.0, 1.0, 2);

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(after.events().len(), 2);

        let failures = manager.take_observer_failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.observer == bad && f.panicked));
        assert_eq!(manager.stats().dispatch.observer_failures, 2);
        assert!(manager.take_observer_failures().is_empty());
    }

    #[test]
    fn test_stop_inside_callback_cancels_rest_of_cycle() {
        let (manager, mock, first) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();

        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        let stopper_slot = slot.clone();
        manager.add_observer(Arc::new(CallbackObserver::new().with_locations(move |_| {
            if let Some(manager) = stopper_slot.get() {
                manager.stop();
            }
        })));
        let last = Arc::new(Recorder::default());
        manager.add_observer(last.clone());
        let _ = slot.set(manager.clone());

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 1);

        // The observer before the stopper saw the locations; nothing else was delivered
        assert_eq!(first.summary(), vec!["locations 1"]);
        assert!(last.events().is_empty());
        assert!(!manager.is_running());
        assert_eq!(manager.stats().dispatch.events_cancelled, 2);

        manager.shutdown();
    }

    #[test]
    fn test_cancelled_transitions_stay_paired() {
        let (manager, mock, recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();

        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        let armed = Arc::new(AtomicBool::new(true));
        {
            let slot = slot.clone();
            let armed = armed.clone();
            manager.add_observer(Arc::new(CallbackObserver::new().with_locations(move |_| {
                if armed.swap(false, Ordering::SeqCst) {
                    if let Some(manager) = slot.get() {
                        manager.stop();
                    }
                }
            })));
        }
        let _ = slot.set(manager.clone());

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 1);
        assert_eq!(recorder.summary(), vec!["locations 1"]);

        // The entry was never delivered, so the next session reports it
        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 2);
        mock.emit_fix(20.0, 20.0, 1.0, 3);
        assert_eq!(
            recorder.summary(),
            vec!["locations 1", "locations 1", "enter G1", "locations 1", "exit G1"]
        );

        manager.shutdown();
    }

    #[test]
    fn test_stop_in_callback_after_delivered_entry_keeps_membership() {
        let (manager, mock, recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();

        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        {
            let slot = slot.clone();
            manager.add_observer(Arc::new(CallbackObserver::new().with_enter_region(move |_| {
                if let Some(manager) = slot.get() {
                    manager.stop();
                }
            })));
        }
        let _ = slot.set(manager.clone());

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 1);
        manager.start().unwrap();
        mock.emit_fix(20.0, 20.0, 1.0, 2);

        assert_eq!(
            recorder.summary(),
            vec!["locations 1", "enter G1", "locations 1", "exit G1"]
        );
        manager.shutdown();
    }

    /// Producer whose thread pushes one status once released, and joins on stop
    struct GatedProducer {
        gate: Option<mpsc::Receiver<()>>,
        worker: Option<thread::JoinHandle<()>>,
        stops: Arc<AtomicUsize>,
    }

    impl PositioningProducer for GatedProducer {
        fn start(&mut self, sink: EventSink) -> ProducerResult<()> {
            let gate = self.gate.take().ok_or_else(|| ProducerError::StartFailed {
                reason: "gate already used".to_string(),
            })?;
            self.worker = Some(thread::spawn(move || {
                if gate.recv().is_ok() {
                    sink.push_status(Status::Limited);
                }
            }));
            Ok(())
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    #[test]
    fn test_stop_in_callback_does_not_join_producer_waiting_on_cycle() {
        let (release, gate) = mpsc::channel();
        let stops = Arc::new(AtomicUsize::new(0));
        let producer = GatedProducer {
            gate: Some(gate),
            worker: None,
            stops: stops.clone(),
        };
        let manager = LocationManager::with_producer(BridgeConfig::default(), producer).unwrap();

        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        {
            let slot = slot.clone();
            let release = Mutex::new(Some(release));
            manager.add_observer(Arc::new(CallbackObserver::new().with_status(move |status| {
                if !matches!(status, Status::Available) {
                    return;
                }
                if let Some(release) = release.lock().take() {
                    let _ = release.send(());
                }
                // Give the producer thread time to block on this cycle
                thread::sleep(Duration::from_millis(50));
                if let Some(manager) = slot.get() {
                    manager.stop();
                }
            })));
        }
        let _ = slot.set(manager.clone());
        manager.start().unwrap();

        let (done, finished) = mpsc::channel();
        let host = manager.event_sink();
        thread::spawn(move || {
            host.push_status(Status::Available);
            let _ = done.send(());
        });

        assert!(finished.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(!manager.is_running());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(manager.last_status(), Some(Status::Available));
        manager.shutdown();
    }

    #[test]
    fn test_stop_and_start_in_one_callback_keeps_producer_running() {
        let (manager, mock, recorder) = mocked();
        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        {
            let slot = slot.clone();
            manager.add_observer(Arc::new(CallbackObserver::new().with_locations(move |_| {
                if let Some(manager) = slot.get() {
                    manager.stop();
                    manager.start().unwrap();
                }
            })));
        }
        let _ = slot.set(manager.clone());

        manager.start().unwrap();
        mock.emit_fix(1.0, 1.0, 1.0, 1);

        assert!(manager.is_running());
        assert!(mock.is_running());
        assert_eq!(mock.stop_count(), 0);
        // First fix of the new session bypasses the filter
        mock.emit_fix(1.0, 1.0, 1.0, 2);
        assert_eq!(recorder.summary(), vec!["locations 1", "locations 1"]);
        manager.shutdown();
    }

    #[test]
    fn test_observer_changes_apply_after_cycle() {
        let (manager, mock, _recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();

        let late = Arc::new(Recorder::default());
        let removed = Arc::new(Recorder::default());
        let removed_handle = manager.add_observer(removed.clone());

        let slot: Arc<OnceLock<LocationManager>> = Arc::new(OnceLock::new());
        let once = Arc::new(AtomicBool::new(false));
        {
            let slot = slot.clone();
            let late = late.clone();
            let once = once.clone();
            manager.add_observer(Arc::new(CallbackObserver::new().with_locations(move |_| {
                if once.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Some(manager) = slot.get() {
                    manager.add_observer(late.clone());
                    manager.remove_observer(removed_handle);
                }
            })));
        }
        let _ = slot.set(manager.clone());

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 1);
        mock.emit_fix(20.0, 20.0, 1.0, 2);

        // Removed observer still completes the first cycle, the new one starts with the second
        assert_eq!(removed.summary(), vec!["locations 1", "enter G1"]);
        assert_eq!(late.summary(), vec!["locations 1", "exit G1"]);

        manager.shutdown();
    }

    #[test]
    fn test_push_from_callback_is_delivered_after_cycle() {
        let (manager, mock, recorder) = mocked();
        manager.register_geofence(square("G1", 10.0)).unwrap();
        let sink = manager.event_sink();
        let pushed = Arc::new(AtomicBool::new(false));
        {
            let pushed = pushed.clone();
            manager.add_observer(Arc::new(CallbackObserver::new().with_locations(move |_| {
                if !pushed.swap(true, Ordering::SeqCst) {
                    sink.push_status(Status::Limited);
                }
            })));
        }

        manager.start().unwrap();
        mock.emit_fix(5.0, 5.0, 1.0, 1);

        assert_eq!(recorder.summary(), vec!["locations 1", "enter G1", "status-changed"]);
    }

    #[test]
    fn test_batch_delivered_in_one_call() {
        let (manager, _mock, recorder) = mocked();
        manager.start().unwrap();
        let sink = manager.event_sink();
        assert!(sink.push_fixes(vec![
            RawFix::new(1.0, 1.0, 1.0, 1),
            RawFix::new(1.0, 1.0, 1.0, 2),
            RawFix::new(2.0, 2.0, 1.0, 3),
        ]));
        assert!(!sink.push_fixes(Vec::new()));

        match &recorder.events()[..] {
            [BridgeEvent::Locations(locations)] => {
                let stamps: Vec<_> = locations.iter().map(|l| l.timestamp_ms).collect();
                assert_eq!(stamps, vec![1, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_floor_plan_hint() {
        let (manager, mock, recorder) = mocked();
        manager.start().unwrap();
        manager.set_location(LocationHint::floor_plan("fp-7"));
        mock.emit_fix(1.0, 1.0, 1.0, 1);

        assert_eq!(mock.hints(), vec![LocationHint::floor_plan("fp-7")]);
        assert_eq!(recorder.summary(), vec!["locations 1", "enter fp-7"]);
        let region = manager.last_location().unwrap().region.unwrap();
        assert_eq!(region.region_type(), RegionType::FloorPlan);

        // The hint does not bypass the distance filter
        mock.emit_fix(1.0, 1.0, 1.0, 2);
        assert_eq!(recorder.events().len(), 2);
    }

    #[test]
    fn test_coordinate_hint_only_reaches_producer() {
        let (manager, mock, recorder) = mocked();
        manager.start().unwrap();
        let guess = Location::new(Coordinate::new(1.0, 1.0), 10.0, 0);
        manager.set_location(LocationHint::coordinate(guess));

        assert_eq!(mock.hints().len(), 1);
        assert!(manager.last_location().is_none());
        assert!(recorder.events().is_empty());

        mock.emit_fix(1.0, 1.0, 1.0, 1);
        assert!(manager.last_location().unwrap().region.is_none());
        assert_eq!(recorder.summary(), vec!["locations 1"]);
    }

    #[test]
    fn test_venue_hint_fills_floor() {
        let (manager, mock, _recorder) = mocked();
        manager.start().unwrap();
        manager.set_location(LocationHint::venue("v-1", Some(Floor::new(3))));
        mock.emit_fix(1.0, 1.0, 1.0, 1);
        assert_eq!(manager.last_location().unwrap().floor, Some(Floor::new(3)));
    }

    #[test]
    fn test_accuracy_forwarded() {
        let (manager, mock, _recorder) = mocked();
        assert_eq!(mock.desired_accuracy(), Some(AccuracyMode::Best));
        manager.set_desired_accuracy(AccuracyMode::LowPower);
        assert_eq!(mock.desired_accuracy(), Some(AccuracyMode::LowPower));
        assert_eq!(manager.config().desired_accuracy, AccuracyMode::LowPower);
    }

    #[test]
    fn test_credentials_forwarded() {
        let (manager, mock, _recorder) = mocked();
        manager.set_api_key("key", "secret").unwrap();
        assert_eq!(mock.credentials(), Some(ApiCredentials::new("key", "secret")));

        mock.reject_credentials(true);
        let err = manager.set_api_key("other", "secret").unwrap_err();
        assert!(matches!(
            err,
            crate::api::types::BridgeError::Producer(ProducerError::AuthenticationRejected { .. })
        ));
        assert_eq!(manager.config().credentials.unwrap().api_key, "key");

        assert!(manager.set_api_key("", "secret").is_err());
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let (manager, mock, _recorder) = mocked();
        mock.fail_next_start("no signal");
        assert!(manager.start().is_err());
        assert_eq!(manager.session_state(), SessionState::Stopped);

        manager.start().unwrap();
        assert!(manager.is_running());
    }

    #[test]
    fn test_filter_setters_validate() {
        let manager = LocationManager::new(BridgeConfig::default()).unwrap();
        manager.set_distance_filter(2.0).unwrap();
        manager.set_heading_filter(5.0).unwrap();
        manager.set_attitude_filter(3.0).unwrap();
        assert_eq!(manager.distance_filter(), 2.0);
        assert_eq!(manager.heading_filter(), 5.0);
        assert_eq!(manager.attitude_filter(), 3.0);

        assert!(manager.set_distance_filter(-1.0).is_err());
        assert!(manager.set_heading_filter(f64::NAN).is_err());
        assert_eq!(manager.distance_filter(), 2.0);
    }

    #[test]
    fn test_sink_detaches_when_manager_dropped() {
        let manager = LocationManager::new(BridgeConfig::default()).unwrap();
        let sink = manager.event_sink();
        assert!(sink.is_connected());
        drop(manager);
        assert!(!sink.is_connected());
        assert!(!sink.push_status(Status::Available));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BridgeConfig {
            distance_filter_m: -2.0,
            ..BridgeConfig::default()
        };
        assert!(LocationManager::new(config).is_err());
    }

    #[test]
    fn test_replay_scenario_end_to_end() {
        let scenario = Scenario::demo().unwrap();
        let (geofences, producer) = scenario.into_parts();
        let producer = producer.with_time_scale(0.0);
        let monitor = producer.monitor();

        let manager = LocationManager::with_producer(BridgeConfig::default(), producer).unwrap();
        for geofence in geofences {
            manager.register_geofence(geofence).unwrap();
        }
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        manager.start().unwrap();
        assert!(monitor.wait(Duration::from_secs(10)));
        manager.stop();

        assert_eq!(
            recorder.summary(),
            vec![
                "status-changed",
                "calibration-changed",
                "locations 1",
                "heading",
                "locations 2",
                "enter lobby",
                "calibration-changed",
                "locations 1",
                "exit lobby",
                "enter cafe",
                "attitude",
                "extra-info",
                "locations 1",
                "exit cafe",
                "status-changed",
            ]
        );
        let info = manager.last_extra_info().unwrap();
        assert_eq!(info[crate::core::TRACE_ID_KEY], "demo-trace-0001");
    }

    #[test]
    fn test_replay_stop_is_prompt() {
        let steps = (0..50)
            .map(|i| ReplayStep {
                delay_ms: 1_000,
                input: crate::producer::ReplayInput::Status { status: if i % 2 == 0 { Status::Available } else { Status::Limited } },
            })
            .collect();
        let producer = ReplayProducer::new(steps);
        let monitor = producer.monitor();
        let manager = LocationManager::with_producer(BridgeConfig::default(), producer).unwrap();

        manager.start().unwrap();
        manager.stop();
        assert!(monitor.wait(Duration::from_secs(2)));
        assert!(manager.last_status().is_none());
    }
}

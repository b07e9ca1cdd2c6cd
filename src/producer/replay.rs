//! Threaded producer replaying a scripted timeline

use crate::api::types::LocationHint;
use crate::api::EventSink;
use crate::core::{AccuracyMode, Attitude, CalibrationQuality, ExtraInfo, Heading, Status};
use crate::geofence::Geofence;
use crate::producer::{PositioningProducer, ProducerError, ProducerEvent, ProducerResult, RawFix};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEMO_SCENARIO: &str = include_str!("../../demos/lobby.json");

/// Longest uninterrupted sleep between stop checks
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One scripted producer input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReplayInput {
    Fix(RawFix),
    /// Fixes delivered together as one batch
    Fixes { fixes: Vec<RawFix> },
    Heading { degrees: f64, timestamp_ms: u64 },
    Attitude { w: f64, x: f64, y: f64, z: f64, timestamp_ms: u64 },
    Calibration { quality: CalibrationQuality },
    Status { status: Status },
    ExtraInfo { info: ExtraInfo },
}

impl ReplayInput {
    pub fn into_event(self) -> ProducerResult<ProducerEvent> {
        let invalid = |e: crate::api::types::BridgeError| ProducerError::InvalidSample { reason: e.to_string() };
        Ok(match self {
            ReplayInput::Fix(fix) => ProducerEvent::Fixes(vec![fix]),
            ReplayInput::Fixes { fixes } => ProducerEvent::Fixes(fixes),
            ReplayInput::Heading { degrees, timestamp_ms } => {
                ProducerEvent::Heading(Heading::new(degrees, timestamp_ms).map_err(invalid)?)
            }
            ReplayInput::Attitude { w, x, y, z, timestamp_ms } => {
                ProducerEvent::Attitude(Attitude::new(w, x, y, z, timestamp_ms).map_err(invalid)?)
            }
            ReplayInput::Calibration { quality } => ProducerEvent::Calibration(quality),
            ReplayInput::Status { status } => ProducerEvent::Status(status),
            ReplayInput::ExtraInfo { info } => ProducerEvent::ExtraInfo(info),
        })
    }
}

/// Input preceded by a delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    #[serde(default)]
    pub delay_ms: u64,
    pub input: ReplayInput,
}

impl ReplayStep {
    pub fn immediate(input: ReplayInput) -> Self {
        Self { delay_ms: 0, input }
    }
}

/// Geofences to monitor plus the timeline to replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub geofences: Vec<Geofence>,
    pub timeline: Vec<ReplayStep>,
}

impl Scenario {
    /// Parses a JSON scenario; geofences are validated while loading
    pub fn from_json_str(content: &str) -> ProducerResult<Self> {
        serde_json::from_str(content).map_err(|e| ProducerError::InvalidScenario {
            message: format!("Failed to parse scenario: {}", e),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ProducerResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ProducerError::InvalidScenario {
            message: format!("Failed to read scenario file '{}': {}", path_str, e),
        })?;
        Self::from_json_str(&content)
    }

    /// Walk through a lobby and a cafe, bundled with the crate
    pub fn demo() -> ProducerResult<Self> {
        Self::from_json_str(DEMO_SCENARIO)
    }

    pub fn into_parts(self) -> (Vec<Geofence>, ReplayProducer) {
        (self.geofences, ReplayProducer::new(self.timeline))
    }
}

#[derive(Default)]
struct MonitorState {
    finished: Mutex<bool>,
    condvar: Condvar,
}

/// Completion signal for a replay run
#[derive(Clone, Default)]
pub struct ReplayMonitor {
    state: Arc<MonitorState>,
}

impl ReplayMonitor {
    fn reset(&self) {
        *self.state.finished.lock() = false;
    }

    fn finish(&self) {
        *self.state.finished.lock() = true;
        self.state.condvar.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.state.finished.lock()
    }

    /// Blocks until the run ends or `timeout` elapses; true when it ended
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = self.state.finished.lock();
        while !*finished {
            if self.state.condvar.wait_until(&mut finished, deadline).timed_out() {
                break;
            }
        }
        *finished
    }
}

/// Replays a timeline on a background thread once started.
///
/// Each run starts from the beginning of the timeline. `stop` is honoured
/// between steps and during delays.
pub struct ReplayProducer {
    timeline: Arc<Vec<ReplayStep>>,
    time_scale: f64,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    monitor: ReplayMonitor,
    desired_accuracy: AccuracyMode,
}

impl ReplayProducer {
    pub fn new(timeline: Vec<ReplayStep>) -> Self {
        Self {
            timeline: Arc::new(timeline),
            time_scale: 1.0,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            monitor: ReplayMonitor::default(),
            desired_accuracy: AccuracyMode::default(),
        }
    }

    /// Multiplies every step delay; 0 replays without pauses
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
        self
    }

    pub fn monitor(&self) -> ReplayMonitor {
        self.monitor.clone()
    }

    pub fn desired_accuracy(&self) -> AccuracyMode {
        self.desired_accuracy
    }

    fn run(timeline: Arc<Vec<ReplayStep>>, time_scale: f64, stop: Arc<AtomicBool>, sink: EventSink) {
        for (index, step) in timeline.iter().enumerate() {
            let delay = Duration::from_secs_f64(step.delay_ms as f64 * time_scale / 1000.0);
            if !sleep_unless_stopped(delay, &stop) {
                debug!(step = index, "Replay stopped");
                return;
            }
            match step.input.clone().into_event() {
                Ok(event) => {
                    sink.push(event);
                    if !sink.is_connected() {
                        debug!("Bridge dropped; ending replay");
                        return;
                    }
                }
                Err(e) => warn!(step = index, error = %e, "Skipping invalid replay step"),
            }
        }
        info!(steps = timeline.len(), "Replay finished");
    }
}

/// Sleeps in short slices; false when stop was requested
fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}

impl PositioningProducer for ReplayProducer {
    fn name(&self) -> &str {
        "replay"
    }

    fn start(&mut self, sink: EventSink) -> ProducerResult<()> {
        if self.worker.is_some() {
            return Err(ProducerError::StartFailed {
                reason: "replay already running".to_string(),
            });
        }
        // A fresh flag per run, so a detached previous worker keeps seeing its stop
        self.stop_flag = Arc::new(AtomicBool::new(false));
        self.monitor.reset();

        let timeline = self.timeline.clone();
        let stop = self.stop_flag.clone();
        let monitor = self.monitor.clone();
        let time_scale = self.time_scale;
        let worker = thread::Builder::new()
            .name("replay-producer".to_string())
            .spawn(move || {
                Self::run(timeline, time_scale, stop, sink);
                monitor.finish();
            })
            .map_err(|e| ProducerError::StartFailed {
                reason: format!("Failed to spawn replay thread: {}", e),
            })?;

        info!(steps = self.timeline.len(), "Replay started");
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            return;
        };
        // Stopped from an observer running on the replay thread itself
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("Replay thread panicked");
        }
    }

    fn set_desired_accuracy(&mut self, mode: AccuracyMode) {
        debug!(accuracy = ?mode, "Replay accuracy mode set");
        self.desired_accuracy = mode;
    }

    fn apply_hint(&mut self, hint: &LocationHint) {
        debug!(hint = ?hint, "Replay ignores location hints");
    }
}

impl Drop for ReplayProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

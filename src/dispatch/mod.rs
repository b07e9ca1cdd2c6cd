//! Event fan-out to registered observers.
//!
//! The pipeline turns producer input into [`BridgeEvent`]s; the dispatcher
//! delivers them, in order, to every observer with per-observer isolation.

pub mod diagnostics;
pub mod dispatcher;
pub mod event;
pub mod observer;
pub mod observers;
pub mod pipeline;
pub mod transitions;

pub use diagnostics::{DiagnosticsLog, DispatchStats, ObserverFailure};
pub use dispatcher::EventDispatcher;
pub use event::{BridgeEvent, EventKind};
pub use observer::{CallbackObserver, LocationObserver, ObserverError, ObserverResult};
pub use observers::{ObserverEntry, ObserverHandle, ObserverRegistry};
pub use pipeline::BridgePipeline;
pub use transitions::RegionTracker;
